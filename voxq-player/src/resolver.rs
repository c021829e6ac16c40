//! Metadata resolver
//!
//! Runs the resolver program once per URL. Its stdout carries one JSON
//! object per line (a playlist URL expands to many lines); each line that
//! decodes becomes one [`Track`].

use crate::error::{Error, Result};
use crate::playback::pipeline::URL_PLACEHOLDER;
use futures::Stream;
use http::Uri;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use voxq_common::config::ToolsConfig;
use voxq_common::Track;

/// Resolver flags: keep going on errors, JSON per line, skip DASH manifests
const DEFAULT_RESOLVER_ARGS: [&str; 4] = ["-i", "-j", "--youtube-skip-dash-manifest", URL_PLACEHOLDER];

/// Resolver program and argument template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResolver {
    program: String,
    args: Vec<String>,
}

impl MetadataResolver {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_tools(tools: &ToolsConfig) -> Self {
        Self::new(&tools.resolver, DEFAULT_RESOLVER_ARGS)
    }

    /// Argument list with `{url}` substituted
    pub fn argv(&self, url: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, url))
            .collect()
    }

    /// Start the resolver and stream the tracks it reports
    ///
    /// The child is reaped when the stream ends; dropping the stream early
    /// kills it.
    pub fn resolve(&self, url: &str) -> Result<impl Stream<Item = Track>> {
        let mut child = Command::new(&self.program)
            .args(self.argv(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Resolver(format!("failed to run {}: {}", self.program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Resolver("resolver stdout not captured".to_string()))?;

        info!(%url, "Resolving metadata");
        let url = url.to_string();

        Ok(async_stream::stream! {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            let mut resolved = 0usize;
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        if let Some(track) = parse_metadata_line(&line) {
                            resolved += 1;
                            yield track;
                        }
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "Resolver output read failed");
                        break;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => debug!(%url, resolved, "Resolver finished"),
                Ok(status) => debug!(%url, resolved, %status, "Resolver exited with errors"),
                Err(e) => warn!(%url, error = %e, "Failed to reap resolver"),
            }
        })
    }
}

impl Default for MetadataResolver {
    fn default() -> Self {
        Self::from_tools(&ToolsConfig::default())
    }
}

/// Decode one resolver output line
///
/// Blank lines, undecodable bytes and entries without a page URL yield
/// `None`. Lines are raw bytes so invalid UTF-8 only costs that one line.
pub fn parse_metadata_line(line: &[u8]) -> Option<Track> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match serde_json::from_slice::<Track>(line) {
        Ok(track) if track.webpage_url.is_empty() => {
            warn!(id = %track.id, "Skipping resolver entry without webpage_url");
            None
        }
        Ok(track) => Some(track),
        Err(e) => {
            warn!(error = %e, "Skipping malformed resolver line");
            None
        }
    }
}

/// Accept only absolute http(s) URLs with a host
pub fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let uri: Uri = trimmed
        .parse()
        .map_err(|_| Error::InvalidUrl(raw.to_string()))?;

    let scheme_ok = matches!(uri.scheme_str(), Some("http") | Some("https"));
    let has_host = uri.authority().is_some_and(|a| !a.host().is_empty());
    if !scheme_ok || !has_host {
        return Err(Error::InvalidUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_parse_full_line() {
        let line = r#"{"id":"abc","title":"Song","description":"d","full_title":"Artist - Song","thumbnail":"https://i/t.jpg","webpage_url":"https://example.com/watch?v=abc","duration":215,"extra":"ignored"}"#;
        let track = parse_metadata_line(line.as_bytes()).unwrap();
        assert_eq!(track.id, "abc");
        assert_eq!(track.full_title, "Artist - Song");
        assert_eq!(track.duration, 215);
        assert_eq!(track.remaining, 0);
    }

    #[test]
    fn test_parse_skips_malformed() {
        assert!(parse_metadata_line(b"").is_none());
        assert!(parse_metadata_line(b"   \n").is_none());
        assert!(parse_metadata_line(b"ERROR: video unavailable\n").is_none());
        assert!(parse_metadata_line(br#"{"id": "x""#).is_none());
        assert!(parse_metadata_line(br#"{"id":"no-url"}"#).is_none());
        assert!(parse_metadata_line(b"\xffgarbage\n").is_none());
    }

    #[test]
    fn test_validate_url() {
        assert_eq!(
            validate_url("  https://example.com/watch?v=1 ").unwrap(),
            "https://example.com/watch?v=1"
        );
        assert!(validate_url("http://example.com").is_ok());

        for bad in ["", "example.com/x", "ftp://example.com/a", "/relative/path", "not a url"] {
            assert!(
                matches!(validate_url(bad), Err(Error::InvalidUrl(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_default_argv() {
        let resolver = MetadataResolver::default();
        assert_eq!(
            resolver.argv("https://x/y"),
            vec!["-i", "-j", "--youtube-skip-dash-manifest", "https://x/y"]
        );
    }

    #[tokio::test]
    async fn test_resolve_streams_valid_lines() {
        let one = r#"{"id":"1","webpage_url":"https://x/1","duration":3}"#;
        let two = r#"{"id":"2","webpage_url":"https://x/2","duration":4.9}"#;
        let resolver = MetadataResolver::new("printf", ["%s\\n%s\\n%s\\n", one, "garbage", two]);

        let tracks: Vec<Track> = resolver
            .resolve("https://x/list")
            .unwrap()
            .collect()
            .await;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "1");
        assert_eq!(tracks[1].duration, 4);
    }

    #[tokio::test]
    async fn test_resolve_continues_past_invalid_utf8_line() {
        let one = r#"{"id":"1","webpage_url":"https://x/1"}"#;
        let three = r#"{"id":"3","webpage_url":"https://x/3"}"#;
        let resolver = MetadataResolver::new("printf", ["%s\\n\\377garbage\\n%s\\n", one, three]);

        let ids: Vec<String> = resolver
            .resolve("https://x/list")
            .unwrap()
            .map(|t| t.id)
            .collect()
            .await;
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_missing_resolver_program() {
        let resolver = MetadataResolver::new("/nonexistent/voxq-resolver", ["{url}"]);
        assert!(matches!(
            resolver.resolve("https://x/1").map(|_| ()),
            Err(Error::Resolver(_))
        ));
    }
}
