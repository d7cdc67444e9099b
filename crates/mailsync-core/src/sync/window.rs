//! Choice of which remote messages a pass looks at.

use mailsync_imap::Uid;
use serde::{Deserialize, Serialize};

use super::source::FolderListing;
use crate::message::SyncCursor;

/// Kind of sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Look at the most recent `full` messages.
    Full,
    /// Look at messages after the stored cursor, bounded by `incremental`.
    #[default]
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

/// Upper bounds on the number of messages one pass considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Bound for full passes.
    pub full: usize,
    /// Bound for incremental passes.
    pub incremental: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            full: 1000,
            incremental: 50,
        }
    }
}

impl WindowConfig {
    /// Bound for the given mode.
    #[must_use]
    pub const fn limit(&self, mode: SyncMode) -> usize {
        match mode {
            SyncMode::Full => self.full,
            SyncMode::Incremental => self.incremental,
        }
    }
}

/// Selects the UIDs a pass will consider, oldest first.
///
/// An incremental pass with a cursor from the same UIDVALIDITY takes the
/// oldest UIDs past the cursor, so a backlog drains over several passes.
/// Every other pass takes the newest UIDs.
#[must_use]
pub fn select_window(
    listing: &FolderListing,
    mode: SyncMode,
    cursor: Option<SyncCursor>,
    config: &WindowConfig,
) -> Vec<Uid> {
    let limit = config.limit(mode);

    if mode == SyncMode::Incremental
        && let Some(cursor) = cursor
        && listing.uid_validity == Some(cursor.uid_validity)
    {
        return listing
            .ids
            .iter()
            .copied()
            .filter(|uid| uid.get() > cursor.last_uid)
            .take(limit)
            .collect();
    }

    let start = listing.ids.len().saturating_sub(limit);
    listing.ids[start..].to_vec()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn listing(count: u32, validity: Option<u32>) -> FolderListing {
        FolderListing {
            uid_validity: validity,
            ids: (1..=count).filter_map(Uid::new).collect(),
        }
    }

    fn raw(ids: &[Uid]) -> Vec<u32> {
        ids.iter().map(|uid| uid.get()).collect()
    }

    #[test]
    fn test_full_takes_newest() {
        let window = select_window(
            &listing(5000, Some(1)),
            SyncMode::Full,
            None,
            &WindowConfig::default(),
        );
        assert_eq!(window.len(), 1000);
        assert_eq!(window.first().unwrap().get(), 4001);
        assert_eq!(window.last().unwrap().get(), 5000);
    }

    #[test]
    fn test_small_folder_is_taken_whole() {
        let window = select_window(
            &listing(3, None),
            SyncMode::Full,
            None,
            &WindowConfig::default(),
        );
        assert_eq!(raw(&window), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_folder() {
        let window = select_window(
            &FolderListing::default(),
            SyncMode::Incremental,
            None,
            &WindowConfig::default(),
        );
        assert!(window.is_empty());
    }

    #[test]
    fn test_incremental_without_cursor_takes_newest() {
        let window = select_window(
            &listing(120, Some(7)),
            SyncMode::Incremental,
            None,
            &WindowConfig::default(),
        );
        assert_eq!(window.len(), 50);
        assert_eq!(window.first().unwrap().get(), 71);
    }

    #[test]
    fn test_incremental_resumes_after_cursor() {
        let cursor = SyncCursor {
            uid_validity: 7,
            last_uid: 10,
        };
        let window = select_window(
            &listing(120, Some(7)),
            SyncMode::Incremental,
            Some(cursor),
            &WindowConfig::default(),
        );
        assert_eq!(window.len(), 50);
        assert_eq!(window.first().unwrap().get(), 11);
        assert_eq!(window.last().unwrap().get(), 60);
    }

    #[test]
    fn test_incremental_caught_up_is_empty() {
        let cursor = SyncCursor {
            uid_validity: 7,
            last_uid: 120,
        };
        let window = select_window(
            &listing(120, Some(7)),
            SyncMode::Incremental,
            Some(cursor),
            &WindowConfig::default(),
        );
        assert!(window.is_empty());
    }

    #[test]
    fn test_stale_cursor_is_ignored() {
        let cursor = SyncCursor {
            uid_validity: 6,
            last_uid: 119,
        };
        let window = select_window(
            &listing(120, Some(7)),
            SyncMode::Incremental,
            Some(cursor),
            &WindowConfig::default(),
        );
        assert_eq!(window.len(), 50);
        assert_eq!(window.last().unwrap().get(), 120);
    }

    #[test]
    fn test_full_ignores_cursor() {
        let cursor = SyncCursor {
            uid_validity: 7,
            last_uid: 120,
        };
        let window = select_window(
            &listing(120, Some(7)),
            SyncMode::Full,
            Some(cursor),
            &WindowConfig::default(),
        );
        assert_eq!(window.len(), 120);
    }

    proptest! {
        #[test]
        fn prop_window_bound(
            count in 0u32..6000,
            last_uid in 0u32..6000,
            full in any::<bool>(),
            with_cursor in any::<bool>(),
        ) {
            let config = WindowConfig::default();
            let mode = if full { SyncMode::Full } else { SyncMode::Incremental };
            let cursor = with_cursor.then_some(SyncCursor { uid_validity: 1, last_uid });
            let listing = listing(count, Some(1));

            let window = select_window(&listing, mode, cursor, &config);

            prop_assert!(window.len() <= config.limit(mode));
            prop_assert!(window.len() <= count as usize);
            prop_assert!(window.windows(2).all(|pair| pair[0] < pair[1]));
        }
    }
}
