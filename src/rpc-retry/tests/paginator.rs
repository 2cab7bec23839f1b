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

//! Verify list operations through the invoker. The attempt function simulates
//! a service with a fixed set of pages.

#[cfg(test)]
mod tests {
    use cloud_rpc_retry::Result;
    use cloud_rpc_retry::attempt_context::AttemptContext;
    use cloud_rpc_retry::error::Error;
    use cloud_rpc_retry::error::rpc::{Code, Status};
    use cloud_rpc_retry::exponential_backoff::{ExponentialBackoffBuilder, Jitter};
    use cloud_rpc_retry::invoker::Invoker;
    use cloud_rpc_retry::options::{ClientConfig, RequestOptions};
    use cloud_rpc_retry::paginator::{PageableRequest, PageableResponse};
    use cloud_rpc_retry::retry_policy::{Aip194Strict, RetryPolicyExt};
    use futures::TryStreamExt;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Debug, Default)]
    struct ListBucketsRequest {
        project: String,
        page_token: String,
    }

    impl PageableRequest for ListBucketsRequest {
        fn page_token(&self) -> String {
            self.page_token.clone()
        }
        fn set_page_token(&mut self, token: String) {
            self.page_token = token;
        }
    }

    #[derive(Debug)]
    struct ListBucketsResponse {
        buckets: Vec<String>,
        next_page_token: String,
    }

    impl PageableResponse for ListBucketsResponse {
        type PageItem = String;
        fn next_page_token(&self) -> String {
            self.next_page_token.clone()
        }
        fn into_items(self) -> Vec<String> {
            self.buckets
        }
    }

    /// A fake service returning pages keyed by page token.
    ///
    /// Each token in `failures` makes the first request for that page fail
    /// with `UNAVAILABLE`.
    #[derive(Clone, Default)]
    struct FakeService {
        pages: BTreeMap<String, (Vec<String>, String)>,
        failures: Arc<Mutex<Vec<String>>>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeService {
        fn add_page(mut self, token: &str, items: &[&str], next: &str) -> Self {
            self.pages.insert(
                token.to_string(),
                (items.iter().map(|s| s.to_string()).collect(), next.to_string()),
            );
            self
        }

        fn fail_once(self, token: &str) -> Self {
            self.failures.lock().unwrap().push(token.to_string());
            self
        }

        fn list(&self, request: ListBucketsRequest) -> Result<ListBucketsResponse> {
            assert_eq!(request.project, "projects/test-project");
            self.requests.lock().unwrap().push(request.page_token.clone());
            let mut failures = self.failures.lock().unwrap();
            if let Some(pos) = failures.iter().position(|t| *t == request.page_token) {
                failures.remove(pos);
                return Err(Error::service(
                    Status::default()
                        .set_code(Code::Unavailable)
                        .set_message("try-again"),
                ));
            }
            let (buckets, next_page_token) = self
                .pages
                .get(&request.page_token)
                .cloned()
                .unwrap_or_default();
            Ok(ListBucketsResponse {
                buckets,
                next_page_token,
            })
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn test_invoker() -> Invoker {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_maximum_delay(Duration::from_millis(1))
            .with_jitter(Jitter::None)
            .build()
            .expect("hard-coded values are valid");
        Invoker::new(
            ClientConfig::new()
                .set_retry_policy(Aip194Strict.with_error_limit(3))
                .set_backoff_policy(backoff),
        )
    }

    fn request() -> ListBucketsRequest {
        ListBucketsRequest {
            project: "projects/test-project".into(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refetches_failed_page() -> anyhow::Result<()> {
        let service = FakeService::default()
            .add_page("", &["t0", "t1"], "token-001")
            .add_page("token-001", &["t2", "t3"], "")
            .fail_once("token-001");
        let fake = service.clone();
        let items = test_invoker()
            .list_paged(
                move |_: AttemptContext, request: ListBucketsRequest| {
                    let response = fake.list(request);
                    async move { response }
                },
                request(),
                "ListBuckets",
                RequestOptions::default(),
            )
            .await?;
        assert_eq!(items, vec!["t0", "t1", "t2", "t3"]);
        assert_eq!(service.requests(), vec!["", "token-001", "token-001"]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_list() -> anyhow::Result<()> {
        let service = FakeService::default();
        let fake = service.clone();
        let items = test_invoker()
            .list_paged(
                move |_: AttemptContext, request: ListBucketsRequest| {
                    let response = fake.list(request);
                    async move { response }
                },
                request(),
                "ListBuckets",
                RequestOptions::default(),
            )
            .await?;
        assert!(items.is_empty(), "{items:?}");
        assert_eq!(service.requests(), vec![""]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn pages_in_order() -> anyhow::Result<()> {
        let service = FakeService::default()
            .add_page("", &["a"], "p2")
            .add_page("p2", &[], "p3")
            .add_page("p3", &["b", "c"], "");
        let fake = service.clone();
        let pages = test_invoker()
            .paginator(
                move |_: AttemptContext, request: ListBucketsRequest| {
                    let response = fake.list(request);
                    async move { response }
                },
                request(),
                "ListBuckets",
                RequestOptions::default(),
            )
            .map_ok(|page| page.buckets)
            .try_collect::<Vec<_>>()
            .await?;
        assert_eq!(
            pages,
            vec![vec!["a".to_string()], vec![], vec!["b".into(), "c".into()]]
        );
        assert_eq!(service.requests(), vec!["", "p2", "p3"]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn items_stream() -> anyhow::Result<()> {
        let service = FakeService::default()
            .add_page("", &["a", "b"], "p2")
            .add_page("p2", &["c"], "");
        let fake = service.clone();
        let mut items = test_invoker().items(
            move |_: AttemptContext, request: ListBucketsRequest| {
                let response = fake.list(request);
                async move { response }
            },
            request(),
            "ListBuckets",
            RequestOptions::default(),
        );
        let mut got = Vec::new();
        while let Some(item) = items.next().await {
            got.push(item?);
        }
        assert_eq!(got, vec!["a", "b", "c"]);
        Ok(())
    }
}
