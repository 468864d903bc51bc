//! Lazy page sequences for list APIs.
//!
//! Evidence from a list call is only complete once every page is drained.
//! A failure after the first page surfaces as `PartialPagination` instead of
//! silently yielding a truncated listing.
use crate::error::EvidenceError;
use crate::runner::CommandOutput;
use serde_json::Value;

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Finite, non-restartable sequence of pages.
pub struct Pages<F, N> {
    fetch: F,
    next_token: N,
    cursor: Cursor,
    fetched: usize,
    max_pages: usize,
    last_token: Option<String>,
}

/// Build a page sequence from a page fetcher and a continuation extractor.
///
/// `fetch` receives `None` for the first page and the previous page's token
/// afterwards. The sequence ends when `next_token` returns `None`.
pub fn paginate<F, N>(fetch: F, next_token: N, max_pages: usize) -> Pages<F, N>
where
    F: FnMut(Option<&str>) -> Result<CommandOutput, EvidenceError>,
    N: FnMut(&CommandOutput) -> Option<String>,
{
    Pages {
        fetch,
        next_token,
        cursor: Cursor::Start,
        fetched: 0,
        max_pages: max_pages.max(1),
        last_token: None,
    }
}

impl<F, N> Pages<F, N> {
    fn fail(&mut self, source: EvidenceError) -> EvidenceError {
        self.cursor = Cursor::Done;
        if self.fetched == 0 {
            return source;
        }
        EvidenceError::PartialPagination {
            pages_fetched: self.fetched,
            source: Box::new(source),
        }
    }
}

impl<F, N> Iterator for Pages<F, N>
where
    F: FnMut(Option<&str>) -> Result<CommandOutput, EvidenceError>,
    N: FnMut(&CommandOutput) -> Option<String>,
{
    type Item = Result<CommandOutput, EvidenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };
        if self.fetched >= self.max_pages {
            let limit = self.max_pages;
            return Some(Err(self.fail(EvidenceError::parse(
                "pagination",
                format!("more than {limit} pages; raise max_pages to collect the rest"),
            ))));
        }

        let page = match (self.fetch)(token.as_deref()) {
            Ok(page) => page,
            Err(err) => return Some(Err(self.fail(err))),
        };
        self.fetched += 1;

        match (self.next_token)(&page) {
            Some(next) if token.as_deref() == Some(next.as_str())
                || self.last_token.as_deref() == Some(next.as_str()) =>
            {
                return Some(Err(self.fail(EvidenceError::parse(
                    "pagination",
                    format!("continuation token {next:?} repeated"),
                ))));
            }
            Some(next) => {
                self.last_token = token;
                self.cursor = Cursor::Next(next);
            }
            None => self.cursor = Cursor::Done,
        }
        Some(Ok(page))
    }
}

/// Read a string continuation token at `pointer`; null, empty, or absent ends the sequence.
pub fn token_at(page: &CommandOutput, pointer: &str) -> Option<String> {
    match page.body.pointer(pointer)? {
        Value::String(token) if !token.is_empty() => Some(token.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Drain every page and concatenate the arrays found at `items`.
pub fn drain_items<I>(pages: I, items: &str) -> Result<Value, EvidenceError>
where
    I: IntoIterator<Item = Result<CommandOutput, EvidenceError>>,
{
    let mut collected = Vec::new();
    for (index, page) in pages.into_iter().enumerate() {
        let page = page?;
        match page.body.pointer(items) {
            Some(Value::Array(entries)) => collected.extend(entries.iter().cloned()),
            Some(_) => {
                return Err(EvidenceError::parse(
                    "pagination",
                    format!("page {} value at {items:?} is not an array", index + 1),
                ))
            }
            None => {
                return Err(EvidenceError::parse(
                    "pagination",
                    format!("page {} has no items at {items:?}", index + 1),
                ))
            }
        }
    }
    Ok(Value::Array(collected))
}
