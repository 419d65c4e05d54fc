//! 同時に発生した同一処理を 1 回の実行にまとめる in-flight 重複排除。

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::future::Future;
use tokio::sync::Mutex;

use crate::error::AuthError;

type SharedFetch<T> = BoxFuture<'static, Result<T, AuthError>>;

/// SingleFlight は実行中の Future を 1 つだけ保持し、後続の呼び出し元に共有する。
///
/// スロットは弱参照なので、待機者が全員キャンセルされると実行中の処理も破棄される。
/// 実行が完了するとスロットを空にするため、結果そのものはキャッシュしない。
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    in_flight: Mutex<Option<WeakShared<SharedFetch<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(None),
        }
    }

    /// 実行中の処理があればそれに合流し、無ければ `make` で新しく開始する。
    pub async fn run<F, Fut>(&self, make: F) -> Result<T, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AuthError>> + Send + 'static,
    {
        let fut: Shared<SharedFetch<T>> = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref().and_then(WeakShared::upgrade) {
                Some(existing) => existing,
                None => {
                    let shared = make().boxed().shared();
                    *slot = shared.downgrade();
                    shared
                }
            }
        };

        let result = fut.clone().await;

        let mut slot = self.in_flight.lock().await;
        let finished = slot
            .as_ref()
            .and_then(WeakShared::upgrade)
            .is_none_or(|cur| cur.ptr_eq(&fut));
        if finished {
            *slot = None;
        }

        result
    }
}
