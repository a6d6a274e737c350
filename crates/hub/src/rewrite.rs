// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manifest rewriting applied on the cache write path.
//!
//! These are cosmetic fixes for downstream players: a DASH manifest gets a
//! refresh period and a low-latency target, an audio-only HLS master playlist
//! gets the variant line ffmpeg forgets to emit. Inputs outside the matched
//! patterns pass through byte-exact.

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

const UPDATE_PERIOD: (&str, &str) = ("minimumUpdatePeriod", "PT30S");
const LATENCY_ATTRS: [(&str, &str); 3] = [("target", "2000"), ("min", "1500"), ("max", "3000")];

/// Rewrite a DASH manifest: set `minimumUpdatePeriod` on the root `MPD`
/// element and ensure `MPD/ServiceDescription` has a `Latency` child with the
/// low-latency window. Returns the input unchanged when it does not parse.
pub fn mpd(data: &[u8]) -> Vec<u8> {
    match rewrite_mpd(data) {
        Ok(out) => out,
        Err(_) => data.to_vec(),
    }
}

fn rewrite_mpd(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut reader = Reader::from_reader(data);
    let mut writer = Writer::new(Vec::new());
    let mut in_service_description = false;
    let mut latency_seen = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = e.name();
                if name.as_ref() == b"MPD" {
                    writer.write_event(Event::Start(replace_attrs(&e, &[UPDATE_PERIOD])?))?;
                } else if name.as_ref() == b"ServiceDescription" {
                    in_service_description = true;
                    latency_seen = false;
                    writer.write_event(Event::Start(e))?;
                } else if in_service_description && name.as_ref() == b"Latency" {
                    latency_seen = true;
                    writer.write_event(Event::Start(replace_attrs(&e, &LATENCY_ATTRS)?))?;
                } else {
                    writer.write_event(Event::Start(e))?;
                }
            }
            Event::Empty(e) => {
                let name = e.name();
                if name.as_ref() == b"MPD" {
                    writer.write_event(Event::Empty(replace_attrs(&e, &[UPDATE_PERIOD])?))?;
                } else if name.as_ref() == b"ServiceDescription" {
                    // Expand an empty element so the Latency child fits inside.
                    writer.write_event(Event::Start(e.to_owned()))?;
                    writer.write_event(Event::Empty(latency_element()))?;
                    writer.write_event(Event::End(e.to_end().into_owned()))?;
                } else if in_service_description && name.as_ref() == b"Latency" {
                    latency_seen = true;
                    writer.write_event(Event::Empty(replace_attrs(&e, &LATENCY_ATTRS)?))?;
                } else {
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"ServiceDescription" && in_service_description {
                    if !latency_seen {
                        writer.write_event(Event::Empty(latency_element()))?;
                    }
                    in_service_description = false;
                }
                writer.write_event(Event::End(e))?;
            }
            other => writer.write_event(other)?,
        }
    }

    Ok(writer.into_inner())
}

/// Copy an element, dropping any attribute named in `wanted` and appending the
/// wanted key/value pairs instead.
fn replace_attrs(e: &BytesStart, wanted: &[(&str, &str)]) -> anyhow::Result<BytesStart<'static>> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if wanted.iter().any(|(k, _)| attr.key.as_ref() == k.as_bytes()) {
            continue;
        }
        out.push_attribute(Attribute { key: attr.key, value: attr.value.clone() });
    }
    for (k, v) in wanted {
        out.push_attribute((*k, *v));
    }
    Ok(out)
}

fn latency_element() -> BytesStart<'static> {
    let mut e = BytesStart::new("Latency");
    for (k, v) in LATENCY_ATTRS {
        e.push_attribute((k, v));
    }
    e
}

/// Rewrite an audio-only HLS master playlist.
///
/// ffmpeg emits an `#EXT-X-MEDIA` group without any `#EXT-X-STREAM-INF`
/// variant for audio-only streams, which hls.js refuses to play. Append a
/// synthetic variant referencing the media group. Anything else passes
/// through byte-exact.
pub fn master_playlist(data: &[u8]) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(data) else {
        return data.to_vec();
    };

    let mut media_attrs = None;
    for line in text.lines() {
        if line.starts_with("#EXT-X-STREAM-INF:") {
            return data.to_vec();
        }
        if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA:") {
            media_attrs = Some(rest);
        }
    }
    let Some(attrs) = media_attrs else {
        return data.to_vec();
    };

    let attrs: Vec<&str> = attrs.split(',').collect();
    if attr_value(&attrs, "TYPE") != Some("AUDIO") {
        return data.to_vec();
    }
    let group = attr_value(&attrs, "GROUP-ID").map(strip_quotes).unwrap_or_default();
    let uri = attr_value(&attrs, "URI").map(strip_quotes).unwrap_or_default();

    let mut out = String::with_capacity(text.len() + 96);
    for line in text.lines() {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("#EXT-X-STREAM-INF:BANDWIDTH=132056,CODECS=\"avc1.64001e\",AUDIO=\"");
    out.push_str(group);
    out.push_str("\"\n");
    out.push_str(uri);
    out.into_bytes()
}

fn attr_value<'a>(attrs: &[&'a str], key: &str) -> Option<&'a str> {
    attrs.iter().find_map(|item| {
        let rest = item.strip_prefix(key)?;
        rest.strip_prefix('=')
    })
}

fn strip_quotes(value: &str) -> &str {
    value.trim_start_matches('"').trim_end_matches('"')
}

#[cfg(test)]
#[path = "rewrite_tests.rs"]
mod tests;
