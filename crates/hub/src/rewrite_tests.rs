// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn text(out: Vec<u8>) -> String {
    String::from_utf8(out).unwrap_or_default()
}

#[test]
fn mpd_sets_update_period_on_root() {
    let input = br#"<?xml version="1.0"?><MPD profiles="urn:mpeg:dash"><Period/></MPD>"#;
    let out = text(mpd(input));
    assert!(out.contains(r#"minimumUpdatePeriod="PT30S""#), "{out}");
    assert!(out.contains(r#"profiles="urn:mpeg:dash""#), "{out}");
    assert!(out.contains("<Period/>"), "{out}");
}

#[test]
fn mpd_replaces_existing_update_period() {
    let input = br#"<MPD minimumUpdatePeriod="PT2S"><Period/></MPD>"#;
    let out = text(mpd(input));
    assert!(out.contains(r#"minimumUpdatePeriod="PT30S""#), "{out}");
    assert!(!out.contains("PT2S"), "{out}");
}

#[test]
fn mpd_synthesizes_latency_under_service_description() {
    let input = br#"<MPD><ServiceDescription id="0"><Scope/></ServiceDescription></MPD>"#;
    let out = text(mpd(input));
    assert!(
        out.contains(r#"<Latency target="2000" min="1500" max="3000"/>"#),
        "{out}"
    );
    assert!(out.contains("<Scope/>"), "{out}");
}

#[test]
fn mpd_rewrites_existing_latency() {
    let input =
        br#"<MPD><ServiceDescription><Latency target="9" referenceId="0"/></ServiceDescription></MPD>"#;
    let out = text(mpd(input));
    assert!(out.contains(r#"referenceId="0""#), "{out}");
    assert!(out.contains(r#"target="2000""#), "{out}");
    assert!(out.contains(r#"min="1500""#), "{out}");
    assert!(out.contains(r#"max="3000""#), "{out}");
    assert!(!out.contains(r#"target="9""#), "{out}");
    // Exactly one Latency element.
    assert_eq!(out.matches("<Latency").count(), 1, "{out}");
}

#[test]
fn mpd_without_service_description_only_touches_root() {
    let input = br#"<MPD><Period><AdaptationSet/></Period></MPD>"#;
    let out = text(mpd(input));
    assert!(out.contains("minimumUpdatePeriod"), "{out}");
    assert!(!out.contains("Latency"), "{out}");
}

#[test]
fn mpd_passes_broken_xml_through() {
    let input = b"<MPD><unclosed attr=".as_slice();
    assert_eq!(mpd(input), input.to_vec());
}

#[test]
fn master_appends_variant_for_audio_only() {
    let input = b"#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"g\",URI=\"aud.m3u8\"\n";
    let out = text(master_playlist(input));
    assert!(
        out.ends_with(
            "#EXT-X-STREAM-INF:BANDWIDTH=132056,CODECS=\"avc1.64001e\",AUDIO=\"g\"\naud.m3u8"
        ),
        "{out}"
    );
    assert!(out.starts_with("#EXTM3U\n#EXT-X-MEDIA:"), "{out}");
}

#[test]
fn master_with_existing_variant_passes_through() {
    let input = b"#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"g\",URI=\"a.m3u8\"\n#EXT-X-STREAM-INF:BANDWIDTH=1\nv.m3u8\n";
    assert_eq!(master_playlist(input), input.to_vec());
}

#[test]
fn master_with_video_media_passes_through() {
    let input = b"#EXTM3U\n#EXT-X-MEDIA:TYPE=VIDEO,GROUP-ID=\"v\",URI=\"v.m3u8\"\n";
    assert_eq!(master_playlist(input), input.to_vec());
}

#[test]
fn master_without_media_passes_through() {
    let input = b"#EXTM3U\n#EXT-X-VERSION:3\n";
    assert_eq!(master_playlist(input), input.to_vec());
}

#[test]
fn master_with_invalid_utf8_passes_through() {
    let input = [0xff, 0xfe, 0x00];
    assert_eq!(master_playlist(&input), input.to_vec());
}
