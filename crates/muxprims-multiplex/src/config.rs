use serde::Deserialize;

/// Multiplexer behavior knobs.
///
/// Missing keys fall back to [`Default`] when deserialized:
///
/// ```
/// let config: muxprims_multiplex::MultiplexerConfig =
///     serde_json::from_str(r#"{ "max_channels": 8 }"#).unwrap();
/// assert!(config.strict_frame_types);
/// assert_eq!(config.max_channels, Some(8));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Answer frames with an unrecognized `type` as protocol violations.
    /// When off, they are dispatched as ordinary messages.
    pub strict_frame_types: bool,
    /// Upper bound on concurrently registered channels.
    pub max_channels: Option<usize>,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            strict_frame_types: true,
            max_channels: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: MultiplexerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MultiplexerConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config: MultiplexerConfig =
            serde_json::from_str(r#"{ "strict_frame_types": false, "max_channels": 2 }"#).unwrap();
        assert_eq!(
            config,
            MultiplexerConfig {
                strict_frame_types: false,
                max_channels: Some(2),
            }
        );
    }
}
