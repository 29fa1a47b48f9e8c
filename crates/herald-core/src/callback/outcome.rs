//! Outcome / Eventual - 同期・非同期の結果チャネル
//!
//! # 学習ポイント
//! - `futures::future::Shared` で何度でも await できる Promise
//! - `Eventual<T> = Ready(T) | Pending(Promise<T>)` と明示的なコンビネータ
//! - 「未処理」はコンストラクト不可能なマーカー値で表す

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt, Shared, try_join_all};

use crate::error::{MediatorError, Result};

/// 型消去された値。ハンドラ間で共有される。
pub type Value = Arc<dyn Any + Send + Sync>;

pub type RejectFn = Arc<dyn Fn(MediatorError) + Send + Sync>;

/// Promise は共有可能・複製可能な非同期値
///
/// `with_reject` で協調的キャンセルのフックを持てる（`$timeout` が呼ぶ）。
pub struct Promise<T> {
    inner: Shared<BoxFuture<'static, Result<T>>>,
    reject: Option<RejectFn>,
    token: Arc<()>,
}

impl<T> Clone for Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            reject: self.reject.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
            reject: None,
            token: Arc::new(()),
        }
    }

    pub fn resolved(value: T) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    pub fn rejected(error: MediatorError) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }

    pub fn with_reject<F>(mut self, reject: F) -> Self
    where
        F: Fn(MediatorError) + Send + Sync + 'static,
    {
        self.reject = Some(Arc::new(reject));
        self
    }

    /// Signal cancellation to the producer. Returns whether a hook existed.
    pub fn reject(&self, error: MediatorError) -> bool {
        match &self.reject {
            Some(reject) => {
                reject(error);
                true
            }
            None => false,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.token, &other.token)
    }

    /// The settled result, if the promise has already been driven to completion.
    pub fn peek(&self) -> Option<Result<T>> {
        self.inner.peek().cloned()
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let inner = self.inner.clone();
        Promise {
            inner: async move { f(inner.await?) }.boxed().shared(),
            reject: self.reject.clone(),
            token: Arc::new(()),
        }
    }

    /// Run `f` once this promise settles, successfully or not.
    pub fn finally<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = self.inner.clone();
        Promise {
            inner: async move {
                let result = inner.await;
                f();
                result
            }
            .boxed()
            .shared(),
            reject: self.reject.clone(),
            token: Arc::new(()),
        }
    }

    pub fn all(promises: Vec<Promise<T>>) -> Promise<Vec<T>> {
        Promise::new(try_join_all(promises))
    }
}

impl<T> Future for Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("cancellable", &self.reject.is_some())
            .finish_non_exhaustive()
    }
}

/// Eventual は即値または保留中の値
#[derive(Clone, Debug)]
pub enum Eventual<T: Clone + Send + Sync + 'static> {
    Ready(T),
    Pending(Promise<T>),
}

impl<T> Eventual<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn is_pending(&self) -> bool {
        matches!(self, Eventual::Pending(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Eventual::Ready(value) => Some(value),
            Eventual::Pending(_) => None,
        }
    }

    pub fn into_promise(self) -> Promise<T> {
        match self {
            Eventual::Ready(value) => Promise::resolved(value),
            Eventual::Pending(promise) => promise,
        }
    }

    pub async fn settle(self) -> Result<T> {
        match self {
            Eventual::Ready(value) => Ok(value),
            Eventual::Pending(promise) => promise.await,
        }
    }

    pub fn map<U, F>(self, f: F) -> Result<Eventual<U>>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        Ok(match self {
            Eventual::Ready(value) => Eventual::Ready(f(value)?),
            Eventual::Pending(promise) => Eventual::Pending(Promise::map(&promise, f)),
        })
    }

    /// Ready when every part is ready, otherwise one promise over all parts.
    pub fn join_all(parts: Vec<Eventual<T>>) -> Eventual<Vec<T>> {
        if parts.iter().all(|part| !part.is_pending()) {
            return Eventual::Ready(
                parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Eventual::Ready(value) => Some(value),
                        Eventual::Pending(_) => None,
                    })
                    .collect(),
            );
        }
        let promises = parts.into_iter().map(Eventual::into_promise).collect();
        Eventual::Pending(Promise::all(promises))
    }
}

/// Answer は callback_result の中身（単数または複数）
#[derive(Clone, Debug)]
pub enum Answer {
    One(Option<Value>),
    Many(Vec<Value>),
}

impl Answer {
    pub fn one(self) -> Option<Value> {
        match self {
            Answer::One(value) => value,
            Answer::Many(values) => values.into_iter().next(),
        }
    }

    pub fn many(self) -> Vec<Value> {
        match self {
            Answer::One(value) => value.into_iter().collect(),
            Answer::Many(values) => values,
        }
    }
}

pub type CallbackResult = Eventual<Answer>;

/// The "no binding matched" marker. Only this module can construct one.
#[derive(Clone, Copy)]
pub struct NotHandled(());

impl fmt::Debug for NotHandled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NotHandled")
    }
}

/// Outcome は束縛ハンドラ 1 回分の結果
///
/// - `Unhandled`: マッチしなかった（エラーではない）
/// - `Void`: 処理したが値はない（handle では処理済み扱い）
/// - `Value` / `Pending`: 値（または将来の値）
#[derive(Clone, Debug)]
pub enum Outcome {
    Unhandled(NotHandled),
    Void,
    Value(Value),
    Pending(Promise<Option<Value>>),
}

impl Outcome {
    pub fn unhandled() -> Self {
        Outcome::Unhandled(NotHandled(()))
    }

    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Outcome::Value(Arc::new(value))
    }

    pub fn shared(value: Value) -> Self {
        Outcome::Value(value)
    }

    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        Outcome::Pending(Promise::new(future))
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self, Outcome::Unhandled(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Outcome::Void)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }

    /// `None` for unhandled outcomes.
    pub fn into_eventual(self) -> Option<Eventual<Option<Value>>> {
        match self {
            Outcome::Unhandled(_) => None,
            Outcome::Void => Some(Eventual::Ready(None)),
            Outcome::Value(value) => Some(Eventual::Ready(Some(value))),
            Outcome::Pending(promise) => Some(Eventual::Pending(promise)),
        }
    }
}

impl From<Eventual<Option<Value>>> for Outcome {
    fn from(eventual: Eventual<Option<Value>>) -> Self {
        match eventual {
            Eventual::Ready(Some(value)) => Outcome::Value(value),
            Eventual::Ready(None) => Outcome::Void,
            Eventual::Pending(promise) => Outcome::Pending(promise),
        }
    }
}

/// Values that are themselves `Vec<Value>` are spliced in place.
pub fn flatten(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut flat = Vec::new();
    for value in values {
        match value.downcast_ref::<Vec<Value>>() {
            Some(nested) => flat.extend(flatten(nested.iter().cloned())),
            None => flat.push(value),
        }
    }
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn promise_can_be_awaited_repeatedly() {
        let promise = Promise::resolved(7_u32);
        let copy = promise.clone();
        assert_eq!(promise.await.unwrap(), 7);
        assert_eq!(copy.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn map_and_finally_chain() {
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let promise = Promise::new(async move { rx.await.map_err(|e| MediatorError::failed(e.to_string())) });
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen = flag.clone();
        let doubled = Promise::map(&promise, |n| Ok(n * 2))
            .finally(move || seen.store(true, std::sync::atomic::Ordering::SeqCst));
        assert!(doubled.peek().is_none());
        tx.send(21).unwrap();
        assert_eq!(doubled.await.unwrap(), 42);
        assert!(flag.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn eventual_map_covers_both_arms() {
        let ready = Eventual::Ready(2_u32).map(|n| Ok(n + 1)).unwrap();
        assert_eq!(ready.ready(), Some(&3));

        let pending = Eventual::Pending(Promise::resolved(2_u32))
            .map(|n| Ok(n * 10))
            .unwrap();
        assert!(pending.is_pending());
        assert_eq!(pending.settle().await.unwrap(), 20);

        let failed = Eventual::Ready(1_u32).map(|_| Err::<u32, _>(MediatorError::failed("nope")));
        assert!(failed.is_err());
    }

    #[tokio::test]
    async fn join_all_stays_ready_when_everything_is_ready() {
        let joined = Eventual::join_all(vec![Eventual::Ready(1), Eventual::Ready(2)]);
        assert_eq!(joined.ready(), Some(&vec![1, 2]));

        let mixed = Eventual::join_all(vec![Eventual::Ready(1), Eventual::Pending(Promise::resolved(2))]);
        assert!(mixed.is_pending());
        assert_eq!(mixed.settle().await.unwrap(), vec![1, 2]);
    }

    #[test]
    fn reject_hook_reports_presence() {
        let plain = Promise::resolved(1_u8);
        assert!(!plain.reject(MediatorError::failed("x")));
        let hit = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen = hit.clone();
        let hooked = Promise::resolved(1_u8)
            .with_reject(move |_| seen.store(true, std::sync::atomic::Ordering::SeqCst));
        assert!(Promise::map(&hooked, Ok).reject(MediatorError::failed("x")));
        assert!(hit.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn unhandled_is_distinct_from_void() {
        assert!(Outcome::unhandled().is_unhandled());
        assert!(!Outcome::Void.is_unhandled());
        assert!(Outcome::unhandled().into_eventual().is_none());
    }

    #[test]
    fn flatten_splices_nested_lists() {
        let nested: Value = Arc::new(vec![Arc::new(2_u8) as Value, Arc::new(3_u8) as Value]);
        let flat = flatten(vec![Arc::new(1_u8) as Value, nested]);
        assert_eq!(flat.len(), 3);
    }
}
