use std::sync::{Arc, Mutex};

use core_loader::{
    Coordinator, CursorSource, Keyed, LoadOutcome, Page, PagedSource, SkipReason, SourceError,
};
use pretty_assertions::assert_eq;

const LATEST: u64 = 45;
const EPOCH: i64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    id: u64,
    viewed_at: i64,
}

impl Keyed for Entry {
    type Key = u64;
    fn key(&self) -> u64 {
        self.id
    }
}

/// Server-issued continuation token. The coordinator never looks inside it.
#[derive(Debug, Clone, PartialEq)]
struct HistoryCursor {
    max_id: u64,
    view_at: i64,
}

type CursorLog = Arc<Mutex<Vec<Option<HistoryCursor>>>>;

fn viewed_at(id: u64) -> i64 {
    EPOCH - (LATEST - id) as i64 * 60
}

/// Newest-first history of `LATEST` entries. Each page hands back the id and
/// timestamp to continue below, or no cursor once entry 1 has been served.
fn history(log: CursorLog) -> impl PagedSource<Item = Entry, Cursor = HistoryCursor> {
    CursorSource::<_, Entry, HistoryCursor>::new(
        "history",
        move |cursor: Option<HistoryCursor>, page_size: usize| {
            log.lock().unwrap().push(cursor.clone());
            let top = cursor.map_or(LATEST, |c| c.max_id);
            async move {
                let ids: Vec<u64> = (1..=top).rev().take(page_size).collect();
                let next = ids.last().filter(|&&id| id > 1).map(|&id| HistoryCursor {
                    max_id: id - 1,
                    view_at: viewed_at(id),
                });
                let page = Page::new(
                    ids.into_iter()
                        .map(|id| Entry {
                            id,
                            viewed_at: viewed_at(id),
                        })
                        .collect(),
                );
                let reply: Result<Page<Entry, HistoryCursor>, SourceError> = Ok(match next {
                    Some(cursor) => page.with_cursor(cursor),
                    None => page,
                });
                reply
            }
        },
    )
}

fn ids<S: PagedSource<Item = Entry>>(c: &Coordinator<S>) -> Vec<u64> {
    c.items().iter().map(|e| e.id).collect()
}

#[tokio::test]
async fn opaque_cursors_are_handed_back_unchanged() {
    let log = CursorLog::default();
    let c = Coordinator::new(history(log.clone()), 20);

    assert_eq!(
        c.load_initial().await,
        LoadOutcome::Loaded {
            fetched: 20,
            appended: 20
        }
    );
    assert!(c.status().has_more);
    assert_eq!(
        c.load_more().await,
        LoadOutcome::Loaded {
            fetched: 20,
            appended: 20
        }
    );
    assert_eq!(
        c.load_more().await,
        LoadOutcome::Loaded {
            fetched: 5,
            appended: 5
        }
    );

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            None,
            Some(HistoryCursor {
                max_id: 25,
                view_at: viewed_at(26)
            }),
            Some(HistoryCursor {
                max_id: 5,
                view_at: viewed_at(6)
            }),
        ]
    );
    assert_eq!(ids(&c), (1..=LATEST).rev().collect::<Vec<_>>());
    assert_eq!(c.items()[0].viewed_at, EPOCH);
}

#[tokio::test]
async fn missing_cursor_ends_the_feed() {
    let log = CursorLog::default();
    let c = Coordinator::new(history(log.clone()), 20);
    c.load_initial().await;
    c.load_more().await;
    c.load_more().await;

    let status = c.status();
    assert!(!status.has_more);
    assert!(status.exhausted());
    assert_eq!(
        c.load_more().await,
        LoadOutcome::Skipped(SkipReason::Exhausted)
    );
    assert_eq!(log.lock().unwrap().len(), 3);

    c.refresh().await;
    assert_eq!(log.lock().unwrap().last(), Some(&None));
    assert!(c.status().has_more);
    assert_eq!(c.len(), 20);
}

#[tokio::test]
async fn empty_page_ends_the_feed_despite_a_cursor() {
    let c = Coordinator::new(
        CursorSource::<_, Entry, HistoryCursor>::new(
            "drained",
            |_cursor: Option<HistoryCursor>, _page_size: usize| async {
                let reply: Result<Page<Entry, HistoryCursor>, SourceError> =
                    Ok(Page::new(Vec::new()).with_cursor(HistoryCursor {
                        max_id: 0,
                        view_at: EPOCH,
                    }));
                reply
            },
        ),
        20,
    );
    assert_eq!(
        c.load_initial().await,
        LoadOutcome::Loaded {
            fetched: 0,
            appended: 0
        }
    );
    assert!(c.is_empty());
    assert!(c.status().exhausted());
}
