use crate::traits::PageSource;
use crate::types::{Page, Result, SubjectType};
use futures::stream::{self, Stream};
use std::sync::Arc;
use tracing::debug;

/// Pages through one friend's collection feed until an empty page comes back.
///
/// Pages are produced lazily: the next request is not sent until the consumer
/// polls for it. A failed page ends the stream after yielding the error; pages
/// already yielded stay valid. There is no retry.
pub struct SourceCollector {
    source: Arc<dyn PageSource>,
    page_limit: u32,
}

enum Cursor {
    Next(u32),
    Done,
}

impl SourceCollector {
    pub fn new(source: Arc<dyn PageSource>, page_limit: u32) -> Self {
        Self {
            source,
            page_limit: page_limit.max(1),
        }
    }

    pub fn collect<'a>(
        &'a self,
        source_id: &'a str,
        subject_type: SubjectType,
    ) -> impl Stream<Item = Result<Page>> + Send + 'a {
        stream::unfold(Cursor::Next(0), move |cursor| async move {
            let offset = match cursor {
                Cursor::Next(offset) => offset,
                Cursor::Done => return None,
            };

            match self
                .source
                .fetch_page(source_id, subject_type, self.page_limit, offset)
                .await
            {
                Ok(contributions) if contributions.is_empty() => {
                    debug!("Collections for {} exhausted at offset {}", source_id, offset);
                    None
                }
                Ok(contributions) => {
                    let page = Page { offset, contributions };
                    Some((Ok(page), Cursor::Next(offset + self.page_limit)))
                }
                Err(e) => Some((Err(e), Cursor::Done)),
            }
        })
    }
}
