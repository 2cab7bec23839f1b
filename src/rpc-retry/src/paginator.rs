// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use futures::stream::unfold;
use futures::{Stream, StreamExt};
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;

/// Describes a list request that can be sent for any page.
pub trait PageableRequest: Clone {
    /// The token of the page to fetch. An empty token requests the first page.
    fn page_token(&self) -> String;

    /// Sets the token of the page to fetch.
    fn set_page_token(&mut self, token: String);
}

/// Describes a type that can be iterated over asyncly when used with [Paginator].
pub trait PageableResponse {
    type PageItem;

    /// The token for the next page. An empty token means there are no more
    /// pages.
    fn next_page_token(&self) -> String;

    /// Consumes the page, returning the items in order.
    fn into_items(self) -> Vec<Self::PageItem>;
}

/// An adapter that converts list RPCs as defined by [AIP-4233](https://google.aip.dev/client-libraries/4233)
/// into a [futures::Stream] that can be iterated over in an async fashion.
///
/// The stream yields each page in order, and stops after the first page with
/// an empty next page token, or after the first error.
#[pin_project]
pub struct Paginator<T, E> {
    #[pin]
    stream: Pin<Box<dyn Stream<Item = Result<T, E>> + Send>>,
}

impl<T, E> Paginator<T, E>
where
    T: PageableResponse + Send + 'static,
    E: Send + 'static,
{
    /// Creates a new [Paginator] given the initial page token and a function
    /// to fetch the next [PageableResponse].
    ///
    /// # Example
    /// ```
    /// # use cloud_rpc_retry::paginator::{Paginator, PageableResponse};
    /// struct Page { items: Vec<String>, next: String }
    /// impl PageableResponse for Page {
    ///     type PageItem = String;
    ///     fn next_page_token(&self) -> String { self.next.clone() }
    ///     fn into_items(self) -> Vec<String> { self.items }
    /// }
    /// # tokio_test::block_on(async {
    /// let mut paginator = Paginator::new(String::new(), |token: String| async move {
    ///     let next = if token.is_empty() { "page-2" } else { "" };
    ///     let items = vec![format!("item from {token:?}")];
///     Ok::<_, std::io::Error>(Page { items, next: next.into() })
    /// });
    /// let mut count = 0;
    /// while let Some(page) = paginator.next().await {
    ///     let _ = page?;
    ///     count += 1;
    /// }
    /// assert_eq!(count, 2);
    /// # Ok::<(), std::io::Error>(()) });
    /// ```
    pub fn new<F, X>(seed_token: String, execute: X) -> Self
    where
        X: Fn(String) -> F + Send + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::with_state(seed_token, (), move |(), token| {
            let page = execute(token);
            async move { ((), page.await) }
        })
    }

    /// Creates a new [Paginator] threading `state` through each page fetch.
    ///
    /// Each call to `execute` receives the state and the page token, and
    /// returns the state for the next call along with the page. Use this to
    /// share mutable data, such as a retry budget, across all the pages of a
    /// list operation.
    pub fn with_state<S, F, X>(seed_token: String, state: S, execute: X) -> Self
    where
        S: Send + 'static,
        X: Fn(S, String) -> F + Send + 'static,
        F: Future<Output = (S, Result<T, E>)> + Send + 'static,
    {
        let stream = unfold(Some((seed_token, state, execute)), |current| async move {
            let Some((token, state, execute)) = current else {
                return None;
            };
            let (state, page) = execute(state, token).await;
            match page {
                Ok(page) => {
                    let token = page.next_page_token();
                    let next = if token.is_empty() {
                        None
                    } else {
                        Some((token, state, execute))
                    };
                    Some((Ok(page), next))
                }
                Err(e) => Some((Err(e), None)),
            }
        });
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Returns the next mutation of the wrapped stream.
    pub fn next(&mut self) -> futures::stream::Next<'_, Self> {
        StreamExt::next(self)
    }

    /// Converts the stream of pages into a stream of items.
    pub fn items(self) -> ItemPaginator<T::PageItem, E>
    where
        T::PageItem: Send + 'static,
    {
        let stream = self
            .stream
            .map(|page| match page {
                Ok(page) => page.into_items().into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            })
            .flat_map(futures::stream::iter);
        ItemPaginator {
            stream: Box::pin(stream),
        }
    }
}

impl<T, E> Stream for Paginator<T, E> {
    type Item = Result<T, E>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.project().stream.poll_next(cx)
    }
}

/// A stream over the items of all the pages in a list operation.
///
/// Items are returned in the order they appear in each page, and pages in the
/// order they were fetched.
#[pin_project]
pub struct ItemPaginator<I, E> {
    #[pin]
    stream: Pin<Box<dyn Stream<Item = Result<I, E>> + Send>>,
}

impl<I, E> ItemPaginator<I, E> {
    /// Returns the next mutation of the wrapped stream.
    pub fn next(&mut self) -> futures::stream::Next<'_, Self> {
        StreamExt::next(self)
    }
}

impl<I, E> Stream for ItemPaginator<I, E> {
    type Item = Result<I, E>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.project().stream.poll_next(cx)
    }
}
