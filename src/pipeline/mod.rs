//! The request pipeline: queueing, deduplication, batching, retry and
//! dispatch against a single backend endpoint.
//!
//! A [`Pipeline`] owns a three-lane priority queue, a per-operation circuit
//! breaker map, an accumulating batch table and a bounded completion
//! history. Submissions return once their operation reaches a terminal
//! outcome; duplicate submissions share one network call. A background
//! coordinator task drains the queue up to the concurrency ceiling and
//! flushes batches whose window elapsed.

pub mod batch;
pub mod history;
pub mod notify;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Notify, broadcast, oneshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};

use crate::config::{CourierConfig, Tunables};
use crate::error::PipelineError;
use crate::operation::{
    Fingerprint, Operation, OperationRecord, OperationResult, Payload, SubmitOptions,
};
use crate::queue::{PriorityQueue, QueueEntry, persist};
use crate::retry::{BreakerDecision, BreakerSnapshot, ErrorKind, RetryEngine};
use crate::transport::{
    HttpTransport, RequestBody, ResponseBody, Transport, TransportRequest, TransportTotals,
};
use batch::{BatchMember, PendingBatch};
use history::{History, HistoryFilter, MetricsCounters, PipelineMetrics};
use notify::Notification;

/// An in-flight operation's bookkeeping: the outcome channels of everyone
/// awaiting it.
struct ActiveOp {
    waiters: Vec<oneshot::Sender<OperationResult>>,
}

/// Cached terminal outcome, served to duplicates inside the dedup window.
struct RecentOutcome {
    at: Instant,
    result: OperationResult,
}

/// Everything behind the single state lock. No await happens while this is
/// held.
struct PipelineState {
    queue: PriorityQueue,
    active: HashMap<Fingerprint, ActiveOp>,
    recent: HashMap<Fingerprint, RecentOutcome>,
    batches: HashMap<String, PendingBatch>,
    history: History,
    metrics: MetricsCounters,
    closed: bool,
}

struct Inner<T: Transport> {
    config: CourierConfig,
    tunables: RwLock<Tunables>,
    transport: T,
    retry: RetryEngine,
    state: Mutex<PipelineState>,
    tasks: Mutex<JoinSet<()>>,
    wake: Notify,
    notifications: broadcast::Sender<Notification>,
}

/// Outcome of admission control for one submission.
enum Submission {
    /// Served from the recent-completion cache without a network call.
    Ready(OperationResult),
    Pending(oneshot::Receiver<OperationResult>),
}

/// Point-in-time internals view for the `status` command and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfo {
    pub lane_depths: [usize; 3],
    pub active: usize,
    pub open_batches: usize,
    pub closed: bool,
    pub breakers: HashMap<String, BreakerSnapshot>,
    pub tunables: Tunables,
    pub transport: TransportTotals,
}

/// The resilient request pipeline. Construction spawns the coordinator
/// task, so a tokio runtime must be current. Dropping the pipeline shuts it
/// down, force-failing outstanding submissions.
pub struct Pipeline<T: Transport = HttpTransport> {
    inner: Arc<Inner<T>>,
}

impl Pipeline<HttpTransport> {
    pub fn new(config: CourierConfig) -> Self {
        Self::with_transport(config, HttpTransport::new())
    }
}

impl<T: Transport> Pipeline<T> {
    pub fn with_transport(config: CourierConfig, transport: T) -> Self {
        let tunables = config.tunables.clone();
        let mut queue = PriorityQueue::new(tunables.max_queue_size);
        let mut restored = false;
        if let Some(path) = &config.persist_path
            && let Some(snapshot) =
                persist::load(path, Duration::from_millis(tunables.snapshot_max_age_ms))
        {
            for entry in snapshot.into_entries() {
                if queue.enqueue(entry).is_err() {
                    break;
                }
            }
            restored = !queue.is_empty();
        }

        let (notifications, _) = broadcast::channel(64);
        let inner = Arc::new(Inner {
            config,
            tunables: RwLock::new(tunables.clone()),
            transport,
            retry: RetryEngine::new(),
            state: Mutex::new(PipelineState {
                queue,
                active: HashMap::new(),
                recent: HashMap::new(),
                batches: HashMap::new(),
                history: History::new(tunables.history_size),
                metrics: MetricsCounters::new(),
                closed: false,
            }),
            tasks: Mutex::new(JoinSet::new()),
            wake: Notify::new(),
            notifications,
        });

        tokio::spawn(Inner::run(Arc::clone(&inner)));
        if restored {
            inner.wake.notify_one();
        }
        Self { inner }
    }

    /// Submit one operation and wait for its terminal outcome. Duplicates of
    /// an operation already pending or in flight attach to it and observe
    /// the same result; duplicates of one completed inside the dedup window
    /// get the cached result without a network call.
    pub async fn submit(
        &self,
        name: &str,
        payload: Payload,
        options: SubmitOptions,
    ) -> OperationResult {
        match self.enroll(name, payload, options) {
            Ok(Submission::Ready(result)) => result,
            Ok(Submission::Pending(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(PipelineError::PipelineClosed)),
            Err(err) => Err(err),
        }
    }

    /// Admission control. Runs synchronously under the state lock: dedup
    /// lookups, batch accumulation, immediate dispatch or enqueue.
    fn enroll(
        &self,
        name: &str,
        payload: Payload,
        options: SubmitOptions,
    ) -> Result<Submission, PipelineError> {
        let inner = &self.inner;
        if inner.config.resolve_nonce().is_none() {
            return Err(PipelineError::MissingNonce);
        }
        let tunables = inner.tunables_snapshot();
        let batchable = options.batchable;
        let op = Operation::new(name, payload, &options);
        let fingerprint = op.fingerprint();
        let (tx, rx) = oneshot::channel();

        let mut state = inner.state_lock();
        if state.closed {
            return Err(PipelineError::PipelineClosed);
        }
        state.metrics.submitted += 1;
        let window = Duration::from_millis(tunables.dedup_window_ms);
        state.recent.retain(|_, outcome| outcome.at.elapsed() < window);

        if batchable {
            state.metrics.batched += 1;
            let batch = state
                .batches
                .entry(op.name.clone())
                .or_insert_with(|| PendingBatch::new(&op.name));
            batch.push(op, tx);
            if batch.len() >= tunables.batch_size {
                let full = state.batches.remove(name);
                drop(state);
                if let Some(full) = full {
                    Inner::spawn_batch(inner, full, &tunables);
                }
            } else {
                drop(state);
                inner.wake.notify_one();
            }
            return Ok(Submission::Pending(rx));
        }

        if let Some(outcome) = state.recent.get(&fingerprint) {
            let result = outcome.result.clone();
            state.metrics.deduplicated += 1;
            return Ok(Submission::Ready(result));
        }
        if let Some(active) = state.active.get_mut(&fingerprint) {
            active.waiters.push(tx);
            state.metrics.deduplicated += 1;
            return Ok(Submission::Pending(rx));
        }
        if let Some(entry) = state.queue.find_mut(fingerprint) {
            entry.waiters.push(tx);
            state.metrics.deduplicated += 1;
            return Ok(Submission::Pending(rx));
        }

        // Dispatch directly when nothing older is waiting; otherwise queue
        // behind it so lane order stays fair.
        if state.queue.is_empty() && state.active.len() < tunables.max_concurrent {
            state
                .active
                .insert(fingerprint, ActiveOp { waiters: vec![tx] });
            drop(state);
            Inner::spawn_execute(inner, op, fingerprint);
            return Ok(Submission::Pending(rx));
        }

        state.queue.enqueue(QueueEntry::with_waiter(op, tx))?;
        inner.persist_locked(&state);
        drop(state);
        inner.wake.notify_one();
        Ok(Submission::Pending(rx))
    }

    /// Replace the runtime tunables. Queue and history capacities apply
    /// immediately; in-flight operations keep the parameters they started
    /// with.
    pub fn configure(&self, tunables: Tunables) {
        {
            let mut current = self
                .inner
                .tunables
                .write()
                .expect("tunables lock poisoned");
            *current = tunables.clone();
        }
        let mut state = self.inner.state_lock();
        state.queue.set_capacity(tunables.max_queue_size);
        state.history.set_capacity(tunables.history_size);
        drop(state);
        self.inner.wake.notify_one();
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.inner.state_lock().metrics.snapshot()
    }

    pub fn history(&self, filter: &HistoryFilter) -> Vec<OperationRecord> {
        self.inner.state_lock().history.query(filter)
    }

    /// Subscribe to the notification stream. Slow subscribers lose old
    /// events rather than applying backpressure.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    pub fn debug_info(&self) -> DebugInfo {
        let state = self.inner.state_lock();
        DebugInfo {
            lane_depths: state.queue.lane_depths(),
            active: state.active.len(),
            open_batches: state.batches.len(),
            closed: state.closed,
            breakers: self.inner.retry.breakers().snapshots(),
            tunables: self.inner.tunables_snapshot(),
            transport: self.inner.transport.totals(),
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.inner.config
    }

    /// Stop accepting work, persist the backlog, cancel in-flight tasks and
    /// fail every outstanding submission with [`PipelineError::PipelineClosed`].
    /// Idempotent.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let waiters: Vec<oneshot::Sender<OperationResult>> = {
            let mut state = inner.state_lock();
            if state.closed {
                return;
            }
            state.closed = true;
            inner.persist_locked(&state);
            let mut waiters = Vec::new();
            for entry in state.queue.drain() {
                waiters.extend(entry.waiters);
            }
            for (_, active) in state.active.drain() {
                waiters.extend(active.waiters);
            }
            for (_, pending) in std::mem::take(&mut state.batches) {
                for member in pending.members {
                    waiters.push(member.waiter);
                }
            }
            waiters
        };
        inner.tasks_lock().abort_all();
        for waiter in waiters {
            let _ = waiter.send(Err(PipelineError::PipelineClosed));
        }
        inner.wake.notify_one();
    }
}

impl<T: Transport> Drop for Pipeline<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Transport> Inner<T> {
    fn state_lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().expect("pipeline state lock poisoned")
    }

    fn tasks_lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().expect("pipeline task set lock poisoned")
    }

    fn tunables_snapshot(&self) -> Tunables {
        self.tunables
            .read()
            .expect("tunables lock poisoned")
            .clone()
    }

    fn notify(&self, notification: Notification) {
        // Nobody listening is fine.
        let _ = self.notifications.send(notification);
    }

    /// Snapshot the queue to disk if persistence is enabled. Failures are
    /// reported on the notification stream, not propagated; losing the
    /// snapshot only costs warm restart.
    fn persist_locked(&self, state: &PipelineState) {
        if let Some(path) = &self.config.persist_path
            && let Err(err) = persist::save(path, &state.queue)
        {
            self.notify(Notification::persistence_error(&err.to_string()));
        }
    }

    /// The coordinator: reaps finished tasks, flushes due batches and drains
    /// the queue, then parks until woken or the next tick.
    async fn run(inner: Arc<Inner<T>>) {
        loop {
            {
                let mut tasks = inner.tasks_lock();
                while tasks.try_join_next().is_some() {}
            }
            Inner::flush_due_batches(&inner);
            Inner::drain_queue(&inner);

            let (closed, idle) = {
                let state = inner.state_lock();
                (
                    state.closed,
                    state.queue.is_empty() && state.batches.is_empty(),
                )
            };
            if closed {
                return;
            }
            if idle {
                inner.wake.notified().await;
            } else {
                let tick = Duration::from_millis(inner.tunables_snapshot().tick_ms);
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = sleep(tick) => {}
                }
            }
        }
    }

    /// Move queued entries into the active set up to the concurrency
    /// ceiling, spawning an executor task per entry.
    fn drain_queue(inner: &Arc<Inner<T>>) {
        let tunables = inner.tunables_snapshot();
        let mut dispatched = false;
        loop {
            let next = {
                let mut state = inner.state_lock();
                if state.closed || state.active.len() >= tunables.max_concurrent {
                    None
                } else {
                    match state.queue.dequeue() {
                        Some(entry) => {
                            let QueueEntry {
                                op,
                                fingerprint,
                                waiters,
                                ..
                            } = entry;
                            state.active.insert(fingerprint, ActiveOp { waiters });
                            Some((op, fingerprint))
                        }
                        None => None,
                    }
                }
            };
            match next {
                Some((op, fingerprint)) => {
                    dispatched = true;
                    Inner::spawn_execute(inner, op, fingerprint);
                }
                None => break,
            }
        }
        if dispatched {
            let state = inner.state_lock();
            inner.persist_locked(&state);
        }
    }

    /// Flush batches that hit the size threshold or whose window elapsed.
    fn flush_due_batches(inner: &Arc<Inner<T>>) {
        let tunables = inner.tunables_snapshot();
        let window = Duration::from_millis(tunables.batch_window_ms);
        let due: Vec<PendingBatch> = {
            let mut state = inner.state_lock();
            if state.closed {
                return;
            }
            let names: Vec<String> = state
                .batches
                .iter()
                .filter(|(_, b)| b.len() >= tunables.batch_size || b.is_due(window))
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| state.batches.remove(&name))
                .collect()
        };
        for flushed in due {
            Inner::spawn_batch(inner, flushed, &tunables);
        }
    }

    fn spawn_execute(inner: &Arc<Inner<T>>, op: Operation, fingerprint: Fingerprint) {
        let task_inner = Arc::clone(inner);
        inner.tasks_lock().spawn(async move {
            let mut op = op;
            let result = Inner::execute_with_retry(&task_inner, &mut op).await;
            Inner::complete(&task_inner, &op, fingerprint, result);
        });
    }

    /// Execute the members of a flushed batch in submission order, in
    /// chunks of `batch_concurrency`. With fail-fast enabled, members after
    /// a failed chunk are aborted without executing.
    fn spawn_batch(inner: &Arc<Inner<T>>, flushed: PendingBatch, tunables: &Tunables) {
        let chunk_size = tunables.batch_concurrency.max(1);
        let fail_fast = tunables.batch_fail_fast;
        let task_inner = Arc::clone(inner);
        inner.tasks_lock().spawn(async move {
            let mut members = flushed.members.into_iter();
            let mut aborted = false;
            loop {
                let chunk: Vec<BatchMember> = members.by_ref().take(chunk_size).collect();
                if chunk.is_empty() {
                    break;
                }
                if aborted {
                    for member in chunk {
                        let result: OperationResult = Err(PipelineError::BatchAborted);
                        Inner::record_terminal(&task_inner, &member.op, &result);
                        let _ = member.waiter.send(result);
                    }
                    continue;
                }
                let mut join = JoinSet::new();
                for member in chunk {
                    let member_inner = Arc::clone(&task_inner);
                    join.spawn(async move {
                        let mut op = member.op;
                        let result = Inner::execute_with_retry(&member_inner, &mut op).await;
                        Inner::record_terminal(&member_inner, &op, &result);
                        let failed = result.is_err();
                        let _ = member.waiter.send(result);
                        failed
                    });
                }
                let mut any_failed = false;
                while let Some(joined) = join.join_next().await {
                    if matches!(joined, Ok(true)) {
                        any_failed = true;
                    }
                }
                if fail_fast && any_failed {
                    aborted = true;
                }
            }
        });
    }

    /// The retry loop for one operation: breaker check, one network attempt,
    /// classify on failure, back off and go again until terminal.
    async fn execute_with_retry(inner: &Arc<Self>, op: &mut Operation) -> OperationResult {
        loop {
            let tunables = inner.tunables_snapshot();
            let breaker = tunables.breaker_settings();
            let retry_settings = tunables.retry_settings();

            let decision = inner.retry.allow(&op.name, &breaker);
            if decision == BreakerDecision::Reject {
                return Err(PipelineError::CircuitOpen {
                    name: op.name.clone(),
                });
            }

            let request = match inner.build_request(op, &tunables) {
                Ok(request) => request,
                Err(err) => {
                    // The attempt never reached the network; a claimed
                    // half-open trial slot must go back or the circuit can
                    // never recover.
                    if decision == BreakerDecision::AllowTrial {
                        inner.retry.breakers().release_trial(&op.name);
                    }
                    return Err(err);
                }
            };
            match inner.transport.send(request).await {
                Ok(response) => {
                    if !response.envelope_ok {
                        inner.notify(Notification::envelope_mismatch(&op.name));
                    }
                    // The backend answered; a well-formed rejection still
                    // counts as a healthy service for the breaker.
                    inner.retry.record(&op.name, true, &breaker);
                    return match response.envelope {
                        Some(envelope) if envelope.success => Ok(envelope.data),
                        Some(envelope) => Err(PipelineError::Rejected {
                            message: envelope.error_message(),
                        }),
                        None => Ok(match response.body {
                            ResponseBody::Json(value) => value,
                            ResponseBody::Text(text) => serde_json::Value::String(text),
                        }),
                    };
                }
                Err(err) => {
                    inner.retry.record(&op.name, false, &breaker);
                    if !inner.retry.should_retry(
                        &err,
                        op.attempt,
                        &op.name,
                        op.max_retries,
                        &retry_settings,
                        &breaker,
                    ) {
                        return Err(PipelineError::Transport(err));
                    }
                    op.attempt += 1;
                    let cap = ErrorKind::classify(&err)
                        .max_retries()
                        .min(op.max_retries.unwrap_or(retry_settings.max_retries));
                    inner.notify(Notification::retrying(&op.name, op.attempt, cap));
                    {
                        let mut state = inner.state_lock();
                        state.metrics.retries += 1;
                    }
                    sleep(inner.retry.delay_for_error(&err, op.attempt, &retry_settings)).await;
                }
            }
        }
    }

    /// Render the wire request for one attempt. Multipart is selected when
    /// any payload field is structured; everything else goes form-encoded.
    fn build_request(
        &self,
        op: &Operation,
        tunables: &Tunables,
    ) -> Result<TransportRequest, PipelineError> {
        let nonce = self
            .config
            .resolve_nonce()
            .ok_or(PipelineError::MissingNonce)?;
        let mut fields = Vec::with_capacity(op.payload.len() + 2);
        fields.push((
            "action".to_string(),
            format!("{}{}", self.config.action_namespace, op.name),
        ));
        fields.push(("nonce".to_string(), nonce));

        let mut structured = false;
        for (key, value) in &op.payload {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    structured = true;
                    value.to_string()
                }
                other => other.to_string(),
            };
            fields.push((key.clone(), rendered));
        }

        Ok(TransportRequest {
            method: reqwest::Method::POST,
            url: self.config.endpoint.clone(),
            headers: vec![("X-Requested-With".to_string(), "XMLHttpRequest".to_string())],
            body: if structured {
                RequestBody::Multipart(fields)
            } else {
                RequestBody::Form(fields)
            },
            timeout: Duration::from_millis(op.timeout_ms.unwrap_or(tunables.timeout_ms)),
            validate_envelope: true,
        })
    }

    /// Terminal handling for a queued or directly-dispatched operation:
    /// release the active slot, cache the outcome for dedup, archive it and
    /// wake every waiter.
    fn complete(
        inner: &Arc<Self>,
        op: &Operation,
        fingerprint: Fingerprint,
        result: OperationResult,
    ) {
        let duration_ms = (Utc::now() - op.created_at).num_milliseconds().max(0);
        let record = Inner::record_of(inner, op, &result, duration_ms);
        let waiters = {
            let mut state = inner.state_lock();
            if state.closed {
                return;
            }
            let waiters = state
                .active
                .remove(&fingerprint)
                .map(|active| active.waiters)
                .unwrap_or_default();
            state.recent.insert(
                fingerprint,
                RecentOutcome {
                    at: Instant::now(),
                    result: result.clone(),
                },
            );
            state.metrics.record(&result, duration_ms as u64);
            state.history.push(record);
            waiters
        };
        match &result {
            Ok(_) => inner.notify(Notification::completed(&op.name)),
            Err(err) => inner.notify(Notification::failed(&op.name, err.user_message())),
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        inner.wake.notify_one();
    }

    /// Terminal handling for a batch member: archive and notify only. Batch
    /// members carry their waiter with them and never enter the active set.
    fn record_terminal(inner: &Arc<Self>, op: &Operation, result: &OperationResult) {
        let duration_ms = (Utc::now() - op.created_at).num_milliseconds().max(0);
        let record = Inner::record_of(inner, op, result, duration_ms);
        {
            let mut state = inner.state_lock();
            if state.closed {
                return;
            }
            state.metrics.record(result, duration_ms as u64);
            state.history.push(record);
        }
        match result {
            Ok(_) => inner.notify(Notification::completed(&op.name)),
            Err(err) => inner.notify(Notification::failed(&op.name, err.user_message())),
        }
    }

    fn record_of(
        inner: &Arc<Self>,
        op: &Operation,
        result: &OperationResult,
        duration_ms: i64,
    ) -> OperationRecord {
        OperationRecord {
            op_id: op.id.clone(),
            name: op.name.clone(),
            priority: op.priority,
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
            attempts: op.attempt + 1,
            duration_ms,
            breaker_state: inner.retry.breakers().state(&op.name),
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BreakerStateKind;
    use crate::transport::{Envelope, TransportError, TransportResponse};
    use notify::NotificationKind;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Script =
        Box<dyn Fn(usize, &TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

    /// Scripted transport: the closure decides each call's outcome by call
    /// index, with an optional artificial latency.
    struct MockTransport {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
        seen: StdMutex<Vec<TransportRequest>>,
        script: Script,
    }

    impl MockTransport {
        fn scripted(
            delay: Duration,
            script: impl Fn(usize, &TransportRequest) -> Result<TransportResponse, TransportError>
            + Send
            + Sync
            + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
                seen: StdMutex::new(Vec::new()),
                script: Box::new(script),
            })
        }

        fn always_ok(data: serde_json::Value) -> Arc<Self> {
            Self::scripted(Duration::ZERO, move |_, _| Ok(ok_response(data.clone())))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<TransportRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transport for Arc<MockTransport> {
        async fn send(
            &self,
            req: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(req.clone());
            (self.script)(index, &req)
        }
    }

    fn ok_response(data: serde_json::Value) -> TransportResponse {
        TransportResponse {
            status: 200,
            body: ResponseBody::Json(json!({"success": true, "data": data.clone()})),
            envelope: Some(Envelope {
                success: true,
                data,
            }),
            envelope_ok: true,
            latency: Duration::from_millis(5),
        }
    }

    fn rejection(message: &str) -> TransportResponse {
        let data = json!({"message": message});
        TransportResponse {
            status: 200,
            body: ResponseBody::Json(json!({"success": false, "data": data.clone()})),
            envelope: Some(Envelope {
                success: false,
                data,
            }),
            envelope_ok: true,
            latency: Duration::from_millis(5),
        }
    }

    fn http_error(status: u16, message: &str) -> TransportError {
        TransportError::Http {
            status,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    fn test_config() -> CourierConfig {
        CourierConfig {
            nonce: Some("test-nonce".into()),
            persist_path: None,
            ..Default::default()
        }
    }

    fn payload(pairs: &[(&str, serde_json::Value)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Let spawned tasks and the coordinator make progress.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn field<'a>(req: &'a TransportRequest, key: &str) -> Option<&'a str> {
        req.body
            .fields()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[tokio::test(start_paused = true)]
    async fn submit_sends_action_nonce_and_payload() {
        let transport = MockTransport::always_ok(json!({"saved": true}));
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        let result = pipeline
            .submit(
                "save_settings",
                payload(&[("color", json!("#fff"))]),
                SubmitOptions::default(),
            )
            .await;

        assert_eq!(result, Ok(json!({"saved": true})));
        assert_eq!(transport.calls(), 1);
        let seen = transport.seen();
        let req = &seen[0];
        assert_eq!(field(req, "action"), Some("courier_save_settings"));
        assert_eq!(field(req, "nonce"), Some("test-nonce"));
        assert_eq!(field(req, "color"), Some("#fff"));
        assert!(matches!(req.body, RequestBody::Form(_)));
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "X-Requested-With" && v == "XMLHttpRequest"));
    }

    #[tokio::test(start_paused = true)]
    async fn structured_payload_goes_multipart() {
        let transport = MockTransport::always_ok(json!(null));
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        pipeline
            .submit(
                "save_settings",
                payload(&[("options", json!({"a": 1})), ("name", json!("x"))]),
                SubmitOptions::default(),
            )
            .await
            .unwrap();

        let seen = transport.seen();
        assert!(matches!(seen[0].body, RequestBody::Multipart(_)));
        assert_eq!(field(&seen[0], "options"), Some(r#"{"a":1}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_nonce_fails_before_any_network_call() {
        let transport = MockTransport::always_ok(json!(null));
        let config = CourierConfig {
            nonce: None,
            nonce_env: "COURIER_TEST_NONCE_UNSET".into(),
            nonce_file: None,
            persist_path: None,
            ..Default::default()
        };
        let pipeline = Pipeline::with_transport(config, Arc::clone(&transport));

        let result = pipeline
            .submit("save_settings", Payload::new(), SubmitOptions::default())
            .await;
        assert_eq!(result, Err(PipelineError::MissingNonce));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_duplicates_share_one_network_call() {
        let transport = MockTransport::scripted(Duration::from_millis(50), |_, _| {
            Ok(ok_response(json!({"n": 1})))
        });
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));
        let body = payload(&[("color", json!("#fff"))]);

        let (a, b) = tokio::join!(
            pipeline.submit("save_settings", body.clone(), SubmitOptions::default()),
            pipeline.submit("save_settings", body.clone(), SubmitOptions::default()),
        );

        assert_eq!(a, Ok(json!({"n": 1})));
        assert_eq!(a, b);
        assert_eq!(transport.calls(), 1);
        assert_eq!(pipeline.metrics().deduplicated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_fields_do_not_defeat_deduplication() {
        let transport = MockTransport::scripted(Duration::from_millis(50), |_, _| {
            Ok(ok_response(json!(1)))
        });
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        let (a, b) = tokio::join!(
            pipeline.submit(
                "save_settings",
                payload(&[("color", json!("#fff")), ("_ts", json!(1))]),
                SubmitOptions::default(),
            ),
            pipeline.submit(
                "save_settings",
                payload(&[("color", json!("#fff")), ("_ts", json!(2))]),
                SubmitOptions::default(),
            ),
        );

        assert_eq!(a, b);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_completion_serves_cached_result_inside_window() {
        let transport = MockTransport::always_ok(json!({"ok": 1}));
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));
        let body = payload(&[("color", json!("#fff"))]);

        let first = pipeline
            .submit("save_settings", body.clone(), SubmitOptions::default())
            .await;
        let second = pipeline
            .submit("save_settings", body.clone(), SubmitOptions::default())
            .await;
        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1);
        // The cache hit counts as a deduplication.
        assert_eq!(pipeline.metrics().deduplicated, 1);

        // Past the window a fresh call goes out.
        tokio::time::advance(Duration::from_millis(5001)).await;
        pipeline
            .submit("save_settings", body, SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_full_rejects_and_shutdown_fails_waiters() {
        let transport = MockTransport::scripted(Duration::from_secs(60), |_, _| {
            Ok(ok_response(json!(null)))
        });
        let mut config = test_config();
        config.tunables.max_concurrent = 1;
        config.tunables.max_queue_size = 2;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        let mut handles = Vec::new();
        for i in 0..3 {
            let p = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                p.submit(
                    "save_settings",
                    payload(&[("i", json!(i))]),
                    SubmitOptions::default(),
                )
                .await
            }));
            settle().await;
        }

        // One in flight, two queued; the next submission is turned away.
        let result = pipeline
            .submit(
                "save_settings",
                payload(&[("i", json!(99))]),
                SubmitOptions::default(),
            )
            .await;
        assert_eq!(result, Err(PipelineError::QueueFull { pending: 2, limit: 2 }));

        pipeline.shutdown();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(PipelineError::PipelineClosed));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn high_priority_jumps_queued_low_priority() {
        let transport = MockTransport::scripted(Duration::from_millis(10), |_, _| {
            Ok(ok_response(json!(null)))
        });
        let mut config = test_config();
        config.tunables.max_concurrent = 1;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        // Occupy the single slot so later submissions queue.
        let blocker = {
            let p = Arc::clone(&pipeline);
            tokio::spawn(async move {
                p.submit(
                    "blocker",
                    Payload::new(),
                    SubmitOptions::default(),
                )
                .await
            })
        };
        settle().await;

        let mut handles = Vec::new();
        for (name, priority) in [
            ("low_op", crate::operation::Priority::Low),
            ("normal_op", crate::operation::Priority::Normal),
            ("high_op", crate::operation::Priority::High),
        ] {
            let p = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                p.submit(
                    name,
                    Payload::new(),
                    SubmitOptions {
                        priority,
                        ..Default::default()
                    },
                )
                .await
            }));
            settle().await;
        }

        blocker.await.unwrap().unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let order: Vec<String> = transport
            .seen()
            .iter()
            .map(|req| field(req, "action").unwrap().to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "courier_blocker",
                "courier_high_op",
                "courier_normal_op",
                "courier_low_op"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_ceiling_is_never_exceeded() {
        let transport = MockTransport::scripted(Duration::from_millis(20), |_, _| {
            Ok(ok_response(json!(null)))
        });
        let mut config = test_config();
        config.tunables.max_concurrent = 2;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        let mut handles = Vec::new();
        for i in 0..6 {
            let p = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                p.submit(
                    "save_settings",
                    payload(&[("i", json!(i))]),
                    SubmitOptions::default(),
                )
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.calls(), 6);
        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_until_success() {
        let transport = MockTransport::scripted(Duration::ZERO, |index, _| {
            if index < 2 {
                Err(TransportError::Network("connection reset".into()))
            } else {
                Ok(ok_response(json!({"done": true})))
            }
        });
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));
        let mut events = pipeline.subscribe();

        let result = pipeline
            .submit("save_settings", Payload::new(), SubmitOptions::default())
            .await;

        assert_eq!(result, Ok(json!({"done": true})));
        assert_eq!(transport.calls(), 3);
        assert_eq!(pipeline.metrics().retries, 2);

        let mut retrying = 0;
        let mut completed = 0;
        while let Ok(event) = events.try_recv() {
            match event.kind {
                NotificationKind::Retrying { .. } => retrying += 1,
                NotificationKind::Completed => completed += 1,
                _ => {}
            }
        }
        assert_eq!(retrying, 2);
        assert_eq!(completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_and_security_errors_are_terminal() {
        let transport = MockTransport::scripted(Duration::ZERO, |index, _| {
            if index == 0 {
                Err(http_error(404, "not found"))
            } else {
                Err(http_error(403, "nonce expired"))
            }
        });
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        let result = pipeline
            .submit("save_settings", Payload::new(), SubmitOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Transport(TransportError::Http { status: 404, .. }))
        ));

        let result = pipeline
            .submit(
                "save_settings",
                payload(&[("other", json!(1))]),
                SubmitOptions::default(),
            )
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Transport(TransportError::Http { status: 403, .. }))
        ));
        // One attempt each, no retries.
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_rejection_surfaces_message_without_retry() {
        let transport =
            MockTransport::scripted(Duration::ZERO, |_, _| Ok(rejection("Invalid color value")));
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        let result = pipeline
            .submit("save_settings", Payload::new(), SubmitOptions::default())
            .await;
        assert_eq!(
            result,
            Err(PipelineError::Rejected {
                message: "Invalid color value".into()
            })
        );
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn breaker_opens_short_circuits_and_recovers() {
        let transport = MockTransport::scripted(Duration::ZERO, |index, _| {
            if index < 5 {
                Err(http_error(500, "boom"))
            } else {
                Ok(ok_response(json!(null)))
            }
        });
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        // Four failed attempts (1 + 3 retries).
        let first = pipeline
            .submit(
                "save_settings",
                payload(&[("i", json!(1))]),
                SubmitOptions::default(),
            )
            .await;
        assert!(matches!(first, Err(PipelineError::Transport(_))));
        assert_eq!(transport.calls(), 4);

        // The fifth failure trips the circuit; the retry loop stops there.
        let second = pipeline
            .submit(
                "save_settings",
                payload(&[("i", json!(2))]),
                SubmitOptions::default(),
            )
            .await;
        assert!(matches!(second, Err(PipelineError::Transport(_))));
        assert_eq!(transport.calls(), 5);

        // Open circuit short-circuits without touching the network.
        let third = pipeline
            .submit(
                "save_settings",
                payload(&[("i", json!(3))]),
                SubmitOptions::default(),
            )
            .await;
        assert_eq!(
            third,
            Err(PipelineError::CircuitOpen {
                name: "save_settings".into()
            })
        );
        assert_eq!(transport.calls(), 5);

        // After the open timeout the trial request goes through and closes
        // the circuit.
        tokio::time::advance(Duration::from_secs(61)).await;
        let fourth = pipeline
            .submit(
                "save_settings",
                payload(&[("i", json!(4))]),
                SubmitOptions::default(),
            )
            .await;
        assert_eq!(fourth, Ok(json!(null)));
        assert_eq!(
            pipeline.debug_info().breakers["save_settings"].state,
            BreakerStateKind::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_trial_does_not_wedge_the_breaker() {
        let dir = tempfile::tempdir().unwrap();
        let nonce_path = dir.path().join("nonce.txt");
        std::fs::write(&nonce_path, "file-nonce").unwrap();

        let transport = MockTransport::scripted(Duration::from_millis(10), |index, _| {
            if index < 5 {
                Err(http_error(500, "boom"))
            } else {
                Ok(ok_response(json!(null)))
            }
        });
        let mut config = test_config();
        config.nonce = None;
        config.nonce_env = "COURIER_TEST_NONCE_UNSET".into();
        config.nonce_file = Some(nonce_path.clone());
        config.tunables.max_concurrent = 1;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        // Five failures trip the circuit for save_settings.
        for i in 0..2 {
            let result = pipeline
                .submit(
                    "save_settings",
                    payload(&[("i", json!(i))]),
                    SubmitOptions::default(),
                )
                .await;
            assert!(matches!(result, Err(PipelineError::Transport(_))));
        }
        assert_eq!(transport.calls(), 5);

        // Occupy the single slot, then queue a save_settings behind it.
        let blocker = {
            let p = Arc::clone(&pipeline);
            tokio::spawn(async move {
                p.submit("other_op", Payload::new(), SubmitOptions::default())
                    .await
            })
        };
        settle().await;
        let queued = {
            let p = Arc::clone(&pipeline);
            tokio::spawn(async move {
                p.submit(
                    "save_settings",
                    payload(&[("i", json!(2))]),
                    SubmitOptions::default(),
                )
                .await
            })
        };
        settle().await;

        // The nonce source vanishes while the operation waits its turn. By
        // the time the slot frees, the open timeout has elapsed, so dispatch
        // claims the half-open trial and then aborts before the network.
        std::fs::remove_file(&nonce_path).unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        blocker.await.unwrap().unwrap();
        assert_eq!(queued.await.unwrap(), Err(PipelineError::MissingNonce));
        assert_eq!(transport.calls(), 6);

        // With the nonce back, the next request gets the trial and closes
        // the circuit.
        std::fs::write(&nonce_path, "file-nonce").unwrap();
        let recovered = pipeline
            .submit(
                "save_settings",
                payload(&[("i", json!(3))]),
                SubmitOptions::default(),
            )
            .await;
        assert_eq!(recovered, Ok(json!(null)));
        assert_eq!(
            pipeline.debug_info().breakers["save_settings"].state,
            BreakerStateKind::Closed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batch_flushes_at_size_threshold_with_paired_results() {
        let transport = MockTransport::scripted(Duration::ZERO, |_, req| {
            let echo = field(req, "i").unwrap().to_string();
            Ok(ok_response(json!({"i": echo})))
        });
        let mut config = test_config();
        config.tunables.batch_size = 3;
        config.tunables.batch_window_ms = 60_000;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        let mut handles = Vec::new();
        for i in 0..3 {
            let p = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                p.submit(
                    "bulk_update",
                    payload(&[("i", json!(i.to_string()))]),
                    SubmitOptions {
                        batchable: true,
                        ..Default::default()
                    },
                )
                .await
            }));
            settle().await;
        }

        for (i, handle) in handles.into_iter().enumerate() {
            // Each member gets the result for its own payload.
            assert_eq!(handle.await.unwrap(), Ok(json!({"i": i.to_string()})));
        }
        assert_eq!(transport.calls(), 3);
        assert_eq!(pipeline.metrics().batched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn undersized_batch_flushes_when_window_elapses() {
        let transport = MockTransport::scripted(Duration::ZERO, |_, req| {
            let echo = field(req, "i").unwrap().to_string();
            Ok(ok_response(json!({"i": echo})))
        });
        let mut config = test_config();
        config.tunables.batch_size = 10;
        config.tunables.batch_window_ms = 1000;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        // Seven members never reach the size threshold of ten.
        let mut handles = Vec::new();
        for i in 0..7 {
            let p = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                p.submit(
                    "bulk_update",
                    payload(&[("i", json!(i.to_string()))]),
                    SubmitOptions {
                        batchable: true,
                        ..Default::default()
                    },
                )
                .await
            }));
            settle().await;
        }
        assert_eq!(transport.calls(), 0);

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Ok(json!({"i": i.to_string()})));
        }
        assert_eq!(transport.calls(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_batch_aborts_members_after_a_failure() {
        let transport = MockTransport::scripted(Duration::ZERO, |index, _| {
            if index == 0 {
                Err(http_error(400, "bad request"))
            } else {
                Ok(ok_response(json!(null)))
            }
        });
        let mut config = test_config();
        config.tunables.batch_size = 4;
        config.tunables.batch_concurrency = 1;
        config.tunables.batch_fail_fast = true;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        let mut handles = Vec::new();
        for i in 0..4 {
            let p = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                p.submit(
                    "bulk_update",
                    payload(&[("i", json!(i))]),
                    SubmitOptions {
                        batchable: true,
                        ..Default::default()
                    },
                )
                .await
            }));
            settle().await;
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(matches!(&results[0], Err(PipelineError::Transport(_))));
        for result in &results[1..] {
            assert_eq!(*result, Err(PipelineError::BatchAborted));
        }
        // Only the first member reached the network.
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restored_backlog_is_executed_on_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let mut queue = PriorityQueue::new(10);
        for name in ["first_op", "second_op"] {
            let op = Operation::new(name, Payload::new(), &SubmitOptions::default());
            queue.enqueue(QueueEntry::new(op)).unwrap();
        }
        persist::save(&path, &queue).unwrap();

        let transport = MockTransport::always_ok(json!(null));
        let mut config = test_config();
        config.persist_path = Some(path);
        let pipeline = Pipeline::with_transport(config, Arc::clone(&transport));

        for _ in 0..50 {
            if transport.calls() == 2 {
                break;
            }
            tokio::time::advance(Duration::from_millis(100)).await;
            settle().await;
        }
        assert_eq!(transport.calls(), 2);
        assert_eq!(pipeline.metrics().succeeded, 2);
        assert_eq!(pipeline.debug_info().lane_depths, [0, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn history_archives_terminal_operations() {
        let transport = MockTransport::scripted(Duration::ZERO, |index, _| {
            if index == 0 {
                Ok(ok_response(json!(null)))
            } else {
                Err(http_error(404, "missing"))
            }
        });
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        pipeline
            .submit("save_settings", Payload::new(), SubmitOptions::default())
            .await
            .unwrap();
        pipeline
            .submit("load_settings", Payload::new(), SubmitOptions::default())
            .await
            .unwrap_err();

        let all = pipeline.history(&HistoryFilter::default());
        assert_eq!(all.len(), 2);
        // Newest first.
        assert_eq!(all[0].name, "load_settings");
        assert!(!all[0].success);
        assert!(all[0].error.is_some());
        assert_eq!(all[1].attempts, 1);

        let failures = pipeline.history(&HistoryFilter {
            failures_only: true,
            ..Default::default()
        });
        assert_eq!(failures.len(), 1);

        let metrics = pipeline.metrics();
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn configure_applies_new_tunables() {
        let transport = MockTransport::always_ok(json!(null));
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        let mut tunables = Tunables::default();
        tunables.max_queue_size = 7;
        tunables.max_concurrent = 1;
        pipeline.configure(tunables);

        let info = pipeline.debug_info();
        assert_eq!(info.tunables.max_queue_size, 7);
        assert_eq!(info.tunables.max_concurrent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_after_shutdown_is_rejected() {
        let transport = MockTransport::always_ok(json!(null));
        let pipeline = Pipeline::with_transport(test_config(), Arc::clone(&transport));

        pipeline.shutdown();
        let result = pipeline
            .submit("save_settings", Payload::new(), SubmitOptions::default())
            .await;
        assert_eq!(result, Err(PipelineError::PipelineClosed));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_persists_backlog_for_warm_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let transport = MockTransport::scripted(Duration::from_secs(60), |_, _| {
            Ok(ok_response(json!(null)))
        });
        let mut config = test_config();
        config.persist_path = Some(path.clone());
        config.tunables.max_concurrent = 1;
        let pipeline = Arc::new(Pipeline::with_transport(config, Arc::clone(&transport)));

        for i in 0..3 {
            let p = Arc::clone(&pipeline);
            tokio::spawn(async move {
                p.submit(
                    "save_settings",
                    payload(&[("i", json!(i))]),
                    SubmitOptions::default(),
                )
                .await
            });
            settle().await;
        }
        pipeline.shutdown();

        // One was in flight; the two still queued survive in the snapshot.
        let snapshot = persist::load(&path, Duration::from_secs(3600)).unwrap();
        assert_eq!(snapshot.into_entries().len(), 2);
    }
}
