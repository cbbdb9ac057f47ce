use async_trait::async_trait;

use crate::{
    domain::{
        chat::{ChatKind, LastMessage},
        events::MessageEvent,
    },
    store::chat_list::{now_ms, ChatListStore},
};

const DEFAULT_PAGE_SIZE: usize = 5;
const MAX_PAGE_SIZE: usize = 50;

const SWEEP_STARTED: &str = "CHAT_SYNC_SWEEP_STARTED";
const SWEEP_COMPLETED: &str = "CHAT_SYNC_SWEEP_COMPLETED";
const SWEEP_PAGE_FETCH_FAILED: &str = "CHAT_SYNC_SWEEP_PAGE_FETCH_FAILED";
const SWEEP_ABORTED_ACCOUNT_CHANGED: &str = "CHAT_SYNC_SWEEP_ABORTED_ACCOUNT_CHANGED";
const SWEEP_FEED_SHORT_PAGE: &str = "CHAT_SYNC_SWEEP_FEED_SHORT_PAGE";

/// One row of a snapshot feed: a chat the account participates in, with its
/// most recent message when the server knows one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub chat_id: String,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    /// Total item count the feed reports for the whole collection.
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    Unauthorized,
    Unavailable,
    InvalidData,
    Unknown,
}

/// The two paginated snapshot sources the sweep reconciles against.
/// Page numbers are 1-based, matching the server's paging contract.
#[async_trait]
pub trait ChatFeed: Send + Sync {
    async fn fetch_direct_page(
        &self,
        page_num: usize,
        page_size: usize,
    ) -> Result<FeedPage, FeedError>;

    async fn fetch_group_page(
        &self,
        page_num: usize,
        page_size: usize,
    ) -> Result<FeedPage, FeedError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed { folded: usize, skipped: usize },
    /// The sweep stopped without touching the cursor: no active account, or
    /// the active account changed while a round was in flight.
    Aborted,
}

#[derive(Debug, Default)]
struct SweepStats {
    folded: usize,
    skipped: usize,
}

#[derive(Debug, Default)]
struct FeedProgress {
    pages_fetched: usize,
    total: Option<usize>,
    exhausted: bool,
}

impl FeedProgress {
    fn wants_more(&self, page_size: usize) -> bool {
        if self.exhausted {
            return false;
        }

        match self.total {
            None => true,
            Some(total) => self.pages_fetched * page_size < total,
        }
    }

    fn next_page_num(&self) -> usize {
        self.pages_fetched + 1
    }
}

/// Runs one full-sync sweep: pages through both feeds (their per-round
/// fetches in parallel, rounds sequential, at most two requests in flight),
/// folds every new item into the store, and advances the sync cursor to the
/// sweep's start instant once both feeds are exhausted.
///
/// Any page failure aborts the sweep without advancing the cursor; items
/// already folded stay, which is safe because folding is idempotent and the
/// whole sweep is simply retried on the next login.
pub async fn run_sweep(
    store: &ChatListStore,
    feed: &dyn ChatFeed,
    page_size: usize,
) -> Result<SweepOutcome, SweepError> {
    let (Some(account_id), Some(cursor_ms)) = (store.active_account(), store.sync_cursor_ms())
    else {
        tracing::debug!("sweep skipped: no active account");
        return Ok(SweepOutcome::Aborted);
    };

    let page_size = normalize_page_size(page_size);
    let sweep_started_ms = now_ms();

    tracing::info!(
        code = SWEEP_STARTED,
        account_id,
        page_size,
        cursor_ms,
        "chat list sweep started"
    );

    let mut direct = FeedProgress::default();
    let mut group = FeedProgress::default();
    let mut stats = SweepStats::default();

    while direct.wants_more(page_size) || group.wants_more(page_size) {
        let direct_round = async {
            if direct.wants_more(page_size) {
                Some(
                    feed.fetch_direct_page(direct.next_page_num(), page_size)
                        .await,
                )
            } else {
                None
            }
        };
        let group_round = async {
            if group.wants_more(page_size) {
                Some(feed.fetch_group_page(group.next_page_num(), page_size).await)
            } else {
                None
            }
        };
        let (direct_result, group_result) = tokio::join!(direct_round, group_round);

        // The session may have ended while the round was in flight; applying
        // its results would leak one account's chats into another's list.
        if store.active_account().as_deref() != Some(account_id.as_str()) {
            tracing::warn!(
                code = SWEEP_ABORTED_ACCOUNT_CHANGED,
                account_id,
                "sweep aborted: active account changed mid-flight"
            );
            return Ok(SweepOutcome::Aborted);
        }

        if let Some(result) = direct_result {
            let page = result.map_err(|error| page_fetch_failed("direct", &account_id, error))?;
            apply_page(store, &mut direct, page, page_size, ChatKind::Direct, cursor_ms, &mut stats);
        }

        if let Some(result) = group_result {
            let page = result.map_err(|error| page_fetch_failed("group", &account_id, error))?;
            apply_page(store, &mut group, page, page_size, ChatKind::Group, cursor_ms, &mut stats);
        }
    }

    store.advance_cursor(sweep_started_ms);

    tracing::info!(
        code = SWEEP_COMPLETED,
        account_id,
        folded = stats.folded,
        skipped = stats.skipped,
        "chat list sweep completed"
    );

    Ok(SweepOutcome::Completed {
        folded: stats.folded,
        skipped: stats.skipped,
    })
}

fn normalize_page_size(page_size: usize) -> usize {
    match page_size {
        0 => DEFAULT_PAGE_SIZE,
        value if value > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        value => value,
    }
}

fn apply_page(
    store: &ChatListStore,
    progress: &mut FeedProgress,
    page: FeedPage,
    page_size: usize,
    chat_kind: ChatKind,
    cursor_ms: i64,
    stats: &mut SweepStats,
) {
    progress.total = Some(page.total);
    progress.pages_fetched += 1;

    if page.items.is_empty() && progress.wants_more(page_size) {
        // A feed that reports more items than it returns would keep the loop
        // spinning on the same page; treat the short page as exhaustion.
        tracing::warn!(
            code = SWEEP_FEED_SHORT_PAGE,
            total = page.total,
            pages_fetched = progress.pages_fetched,
            "feed returned an empty page below its reported total"
        );
        progress.exhausted = true;
        return;
    }

    for item in page.items {
        let Some(message) = item.last_message else {
            stats.skipped += 1;
            continue;
        };

        let skip = match store.summary(&item.chat_id) {
            // Untracked and older than the cursor: the chat was deliberately
            // removed after this message was already reconciled once.
            None => message.created_at_ms < cursor_ms,
            Some(summary) => summary
                .last_message
                .as_ref()
                .is_some_and(|current| current.id == message.id),
        };

        if skip {
            tracing::debug!(
                chat_id = item.chat_id,
                message_id = message.id,
                "sweep item skipped"
            );
            stats.skipped += 1;
            continue;
        }

        if store.upsert_on_new_message(&MessageEvent::new(item.chat_id, chat_kind, message)) {
            stats.folded += 1;
        } else {
            stats.skipped += 1;
        }
    }
}

fn page_fetch_failed(feed_kind: &str, account_id: &str, error: FeedError) -> SweepError {
    tracing::warn!(
        code = SWEEP_PAGE_FETCH_FAILED,
        feed = feed_kind,
        account_id,
        error = ?error,
        "page fetch failed; sweep aborted without cursor advance"
    );
    map_feed_error(error)
}

fn map_feed_error(error: FeedError) -> SweepError {
    match error {
        FeedError::Unauthorized => SweepError::Unauthorized,
        FeedError::Unavailable | FeedError::Unknown => SweepError::TemporarilyUnavailable,
        FeedError::InvalidData => SweepError::DataContractViolation,
    }
}
