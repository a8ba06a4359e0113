//! Traversal modes and the client-message command surface.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::warn;

/// How a refill treats the destination and exhausted roots.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TraversalMode {
    /// Clear the destination first; exhausted roots restart from the top.
    #[default]
    Replace,
    /// Keep the destination; exhausted roots contribute nothing more.
    Append,
}

impl TraversalMode {
    /// Whether the destination is cleared before refilling.
    pub fn clears_destination(self) -> bool {
        self == Self::Replace
    }

    /// Whether an exhausted root is read again from the top within the same call.
    pub fn wraps_roots(self) -> bool {
        self == Self::Replace
    }
}

/// A parsed refill request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCommand {
    /// Mode of the refill.
    pub mode: TraversalMode,
    /// Number of files wanted; `None` uses the configured limit.
    pub budget: Option<u64>,
}

impl FeedCommand {
    /// Parse a client message addressed to `client_name`.
    ///
    /// The message is `<client_name> <mode> [budget]`. Messages for other
    /// clients, or with fewer than two arguments, yield `None`. An unknown
    /// mode falls back to `last_mode`.
    pub fn parse<S: AsRef<str>>(args: &[S], client_name: &str, last_mode: TraversalMode) -> Option<Self> {
        let [target, mode, rest @ ..] = args else {
            return None;
        };
        if target.as_ref() != client_name {
            return None;
        }

        let mode = match TraversalMode::from_str(mode.as_ref()) {
            Ok(mode) => mode,
            Err(_) => {
                warn!(
                    token = mode.as_ref(),
                    fallback = %last_mode,
                    "Unrecognized refill mode, using last used mode"
                );
                last_mode
            }
        };

        let budget = rest.first().and_then(|raw| match raw.as_ref().trim().parse::<u64>() {
            Ok(budget) => Some(budget),
            Err(_) => {
                warn!(budget = raw.as_ref(), "Ignoring invalid refill budget");
                None
            }
        });

        Some(Self { mode, budget })
    }
}
