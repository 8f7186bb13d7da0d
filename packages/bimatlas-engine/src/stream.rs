//! Product event streaming.
//!
//! Serves a `(branch, revision, filters)` triple as a line-delimited event
//! stream with SSE framing (`data: <json>\n\n`). The producer pages
//! through the store (it never materializes the full result set) and the
//! consumer drives reads.

use crate::deadline::Deadline;
use crate::engine::Engine;
use crate::hierarchy::expand_classes;
use crate::model::{Product, ProductFilter};
use crate::store::row_to_product;
use futures::Stream;
use serde::Serialize;

/// Page size for the paged producer.
const STREAM_PAGE_SIZE: i64 = 256;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProductEvent {
    /// First event: total product count matching the filters.
    Start { total: i64 },
    /// One matching product; `current` is a 1-based counter.
    Product { current: i64, product: Product },
    /// Terminal event.
    End,
    /// Terminal event on failure.
    Error { message: String },
}

/// Frame an event for an SSE transport.
pub fn sse_frame(event: &ProductEvent) -> String {
    match serde_json::to_string(event) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(err) => format!(
            "data: {{\"type\":\"error\",\"message\":\"serialization failed: {err}\"}}\n\n"
        ),
    }
}

impl Engine {
    /// Stream the products visible at `(branch, revision)` that match the
    /// filters, as SSE-framed strings: `start {total}`, one
    /// `product {current, product}` per row, then `end {}`, or a terminal
    /// `error {message}`.
    pub fn stream_products(
        &self,
        branch_id: i64,
        revision: Option<i64>,
        filter: ProductFilter,
        deadline: Deadline,
    ) -> impl Stream<Item = String> + Send + 'static {
        let engine = self.clone();
        async_stream::stream! {
            let rev = match deadline
                .run("stream", engine.resolve_revision(branch_id, revision))
                .await
            {
                Ok(rev) => rev,
                Err(err) => {
                    yield sse_frame(&ProductEvent::Error { message: err.to_string() });
                    return;
                }
            };

            let mut filter = filter;
            filter.ifc_classes = expand_classes(&filter.ifc_classes);

            let total = match deadline
                .run(
                    "stream",
                    engine.relational().count_products_at(branch_id, rev, &filter),
                )
                .await
            {
                Ok(total) => total,
                Err(err) => {
                    yield sse_frame(&ProductEvent::Error { message: err.to_string() });
                    return;
                }
            };
            yield sse_frame(&ProductEvent::Start { total });

            let mut current = 0i64;
            let mut offset = 0i64;
            loop {
                let page = match deadline
                    .run(
                        "stream",
                        engine.relational().products_page(
                            branch_id,
                            rev,
                            &filter,
                            STREAM_PAGE_SIZE,
                            offset,
                        ),
                    )
                    .await
                {
                    Ok(page) => page,
                    Err(err) => {
                        yield sse_frame(&ProductEvent::Error { message: err.to_string() });
                        return;
                    }
                };
                let fetched = page.len();
                for row in &page {
                    current += 1;
                    yield sse_frame(&ProductEvent::Product {
                        current,
                        product: row_to_product(row),
                    });
                }
                if fetched < STREAM_PAGE_SIZE as usize {
                    break;
                }
                offset += STREAM_PAGE_SIZE;
            }

            yield sse_frame(&ProductEvent::End);
        }
    }
}
