// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command templates and argv splitting.
//!
//! The transcoder invocation is not hardcoded: operators drop handlebars
//! templates into the command directory and the start handlers render them
//! with the session parameters. The rendered line is split into argv honoring
//! double-quoted arguments.

use std::path::Path;

use anyhow::Context;
use handlebars::{DirectorySourceOptions, Handlebars};
use serde::Serialize;

/// Render context for the `stream` template.
#[derive(Debug, Clone, Serialize)]
pub struct StreamCommand {
    /// `user/cam` path.
    pub name: String,
    /// Session working directory.
    pub dir: String,
    /// Epoch seconds with microsecond precision.
    pub time: String,
    /// Producer URL.
    pub urlin: String,
    /// The hub's own HTTP port, for `/put` publishing.
    pub port: u16,
    /// Init segment name marker.
    pub init: String,
    /// Extra playlist window in seconds (twice the chunk duration).
    pub extra: u64,
}

/// Render context for the `storage` template.
#[derive(Debug, Clone, Serialize)]
pub struct StorageCommand {
    pub name: String,
    pub dir: String,
    pub time: String,
    pub urlin: String,
    /// Recording output path under the storage root.
    pub urlout: String,
    /// Chunk duration in seconds.
    pub duration: u64,
    /// Number of chunks to keep.
    pub numbers: u64,
}

/// The compiled command templates.
pub struct CommandSet {
    registry: Handlebars<'static>,
}

impl CommandSet {
    /// Register every `.hbs` file in the directory; the template name is the
    /// file stem. An unreadable or empty directory is a startup error.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        // Command lines are not HTML; `&` and friends must render verbatim.
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_templates_directory(dir, DirectorySourceOptions::default())
            .with_context(|| format!("failed to load command templates from {}", dir.display()))?;
        if registry.get_templates().is_empty() {
            anyhow::bail!("no command templates in {}", dir.display());
        }
        Ok(Self { registry })
    }

    pub fn has(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> anyhow::Result<String> {
        self.registry
            .render(name, data)
            .with_context(|| format!("failed to render command template {name:?}"))
    }
}

/// Epoch seconds formatted with microsecond precision, handed to templates as
/// a unique-ish session tag.
pub fn epoch_time_string() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:.6}", now.as_secs_f64())
}

/// Split a rendered command line into argv.
///
/// The line is cut at double quotes. A piece that borders a space on either
/// side has that one space stripped and is then split on spaces; a piece that
/// does not is taken whole. Quotes therefore must not border spaces inside an
/// argument: `"id=0,streams=v id=1,streams=a"` stays one argument, while
/// `"id=0,streams=v id=1,streams=a "` falls apart.
pub fn split_args(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    for piece in input.split('"') {
        let mut piece = piece;
        let mut single = true;
        if let Some(stripped) = piece.strip_prefix(' ') {
            piece = stripped;
            single = false;
        }
        if let Some(stripped) = piece.strip_suffix(' ') {
            piece = stripped;
            single = false;
        }
        if piece.is_empty() {
            continue;
        }
        if single {
            out.push(piece.to_owned());
        } else {
            out.extend(piece.split(' ').filter(|s| !s.is_empty()).map(str::to_owned));
        }
    }
    out
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
