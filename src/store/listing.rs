//! Lazy enumeration of every object under a prefix

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{Error, Result};
use super::{ListRequest, ObjectStore, ObjectSummary};

/// Stream every object under `prefix`, following continuation tokens.
///
/// Pages are fetched on demand. The stream can only be restarted from the
/// beginning.
pub fn list_all<'a>(
    store: &'a dyn ObjectStore,
    prefix: &str,
    page_size: usize,
) -> BoxStream<'a, Result<ObjectSummary>> {
    let prefix = prefix.to_string();

    // None: exhausted, Some(None): first page, Some(Some(t)): resume at t
    let pages = stream::try_unfold(Some(None::<String>), move |state| {
        let prefix = prefix.clone();
        async move {
            let token = match state {
                Some(token) => token,
                None => return Ok(None),
            };

            let request = ListRequest::new(prefix)
                .recursive()
                .max_keys(page_size)
                .continue_from(token);
            let page = store.list(request).await?;
            let next = page.next_token.map(Some);

            Ok::<_, Error>(Some((page.objects, next)))
        }
    });

    pages
        .map_ok(|objects| stream::iter(objects.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
}
