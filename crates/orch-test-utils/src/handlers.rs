//! Tool handlers with observable behavior

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use orch_dispatch::{HandlerFault, HandlerResult, ToolHandler};
use serde_json::{Map, Value};

/// Records every invocation and answers with a fixed payload
///
/// ```rust
/// use orch_test_utils::SpyHandler;
/// use serde_json::json;
///
/// let spy = SpyHandler::returning(json!({"ok": 1}));
/// assert_eq!(spy.call_count(), 0);
/// ```
#[derive(Debug)]
pub struct SpyHandler {
    response: Response,
    calls: Mutex<Vec<Map<String, Value>>>,
}

#[derive(Debug)]
enum Response {
    Echo,
    Fixed(HandlerResult),
}

impl SpyHandler {
    fn with(response: Response) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Spy that answers with its own arguments
    pub fn echo() -> Arc<Self> {
        Self::with(Response::Echo)
    }

    pub fn returning(payload: Value) -> Arc<Self> {
        Self::with(Response::Fixed(Ok(payload)))
    }

    pub fn failing(fault: HandlerFault) -> Arc<Self> {
        Self::with(Response::Fixed(Err(fault)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Arguments of every call, in order
    pub fn calls(&self) -> Vec<Map<String, Value>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolHandler for SpyHandler {
    async fn call(&self, arguments: Map<String, Value>) -> HandlerResult {
        self.calls.lock().unwrap().push(arguments.clone());
        match &self.response {
            Response::Echo => Ok(Value::Object(arguments)),
            Response::Fixed(result) => result.clone(),
        }
    }
}

/// Sleeps before answering; reports whether an in-flight call was dropped
#[derive(Debug)]
pub struct SlowHandler {
    delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
    dropped: Arc<AtomicBool>,
}

struct DropFlag {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            dropped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// True once a call was cancelled before finishing
    pub fn was_cancelled(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for SlowHandler {
    async fn call(&self, _arguments: Map<String, Value>) -> HandlerResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut guard = DropFlag {
            flag: Arc::clone(&self.dropped),
            armed: true,
        };
        tokio::time::sleep(self.delay).await;
        guard.armed = false;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Value::String("finished".to_string()))
    }
}

/// Always fails with the given fault
#[derive(Debug)]
pub struct FailingHandler(pub HandlerFault);

impl FailingHandler {
    pub fn new(message: &str, sub_kind: &str) -> Arc<Self> {
        Arc::new(Self(HandlerFault::new(message).with_sub_kind(sub_kind)))
    }
}

#[async_trait]
impl ToolHandler for FailingHandler {
    async fn call(&self, _arguments: Map<String, Value>) -> HandlerResult {
        Err(self.0.clone())
    }
}

/// Panics when called
#[derive(Debug, Default)]
pub struct PanickingHandler;

#[async_trait]
impl ToolHandler for PanickingHandler {
    async fn call(&self, _arguments: Map<String, Value>) -> HandlerResult {
        panic!("handler panicked on purpose")
    }
}
