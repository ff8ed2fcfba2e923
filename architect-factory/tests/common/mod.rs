//! Scripted fakes for the factory's capability traits.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use architect_factory::error::{Error, Result};
use architect_factory::events::Recorder;
use architect_factory::factory::{Factory, FactoryConfig, Role};
use architect_factory::fallback::{FallbackStore, LocalStore};
use architect_factory::llm::Completion;
use architect_factory::project::{ProjectRecord, StoredProject};
use architect_factory::store::{QueryLimit, QueryResult, RecordStore};

pub const FOO_IDEA: &str =
    r#"{"name":"Foo","problem":"p","solution":"s","stack":"Web","monetization":"ads"}"#;

/// A recorded completion call.
#[derive(Debug, Clone)]
pub struct Call {
    pub role: Role,
    pub user: String,
    pub temperature: f32,
}

/// Completion backend that answers per role.
///
/// Scout answers are consumed from a queue (the last one repeats); other
/// roles return a fixed answer or fail.
pub struct ScriptedLlm {
    scout: Mutex<VecDeque<Result<String>>>,
    scout_last: Mutex<Option<String>>,
    answers: Mutex<HashMap<Role, std::result::Result<String, String>>>,
    calls: Mutex<Vec<Call>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn role_for(system: &str) -> Role {
    Role::ALL
        .into_iter()
        .find(|r| r.system_prompt() == Some(system))
        .expect("unknown system prompt")
}

impl ScriptedLlm {
    /// Every role succeeds: Scout returns `FOO_IDEA`, QA approves.
    pub fn happy() -> Self {
        let mut answers = HashMap::new();
        answers.insert(Role::Ui, Ok("<View><Text>Foo</Text></View>".to_string()));
        answers.insert(Role::Logic, Ok("export function useFoo() {}".to_string()));
        answers.insert(Role::Integrator, Ok(r#"{"expo":{"name":"Foo"}}"#.to_string()));
        answers.insert(Role::Growth, Ok(r#"{"cta":"Try Foo"}"#.to_string()));
        answers.insert(Role::Qa, Ok("APPROVED".to_string()));
        Self {
            scout: Mutex::new(VecDeque::from([Ok(FOO_IDEA.to_string())])),
            scout_last: Mutex::new(None),
            answers: Mutex::new(answers),
            calls: Mutex::new(Vec::new()),
            delay: Duration::from_millis(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_scout(self, replies: Vec<&str>) -> Self {
        *self.scout.lock().unwrap() = replies.into_iter().map(|r| Ok(r.to_string())).collect();
        self
    }

    pub fn with_scout_error(self, message: &str) -> Self {
        *self.scout.lock().unwrap() = VecDeque::from([Err(Error::Completion(message.to_string()))]);
        self
    }

    pub fn answer(self, role: Role, text: &str) -> Self {
        self.answers.lock().unwrap().insert(role, Ok(text.to_string()));
        self
    }

    pub fn fail(self, role: Role, message: &str) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(role, Err(message.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, role: Role) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.role == role).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_scout(&self) -> Result<String> {
        let mut queue = self.scout.lock().unwrap();
        match queue.pop_front() {
            Some(Ok(text)) => {
                *self.scout_last.lock().unwrap() = Some(text.clone());
                Ok(text)
            }
            Some(Err(e)) => Err(e),
            None => self
                .scout_last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::Completion("scout script exhausted".into())),
        }
    }
}

#[async_trait]
impl Completion for ScriptedLlm {
    async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let role = role_for(system);
        self.calls.lock().unwrap().push(Call {
            role,
            user: user.to_string(),
            temperature,
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if role == Role::Scout {
            return self.next_scout();
        }
        match self.answers.lock().unwrap().get(&role) {
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(message)) => Err(Error::Completion(message.clone())),
            None => Err(Error::Completion(format!("no answer scripted for {role}"))),
        }
    }
}

/// Primary store fake that remembers inserts and can be told to fail.
#[derive(Default)]
pub struct FakeStore {
    inserted: Mutex<Vec<ProjectRecord>>,
    attempts: AtomicUsize,
    failure: Mutex<Option<String>>,
    delay: Duration,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        let store = Self::default();
        *store.failure.lock().unwrap() = Some(message.to_string());
        store
    }

    /// Every insert waits `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inserted(&self) -> Vec<ProjectRecord> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn insert_project(&self, record: &ProjectRecord) -> Result<QueryResult> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(Error::Store(message));
        }
        self.inserted.lock().unwrap().push(record.clone());
        Ok(QueryResult {
            success: true,
            ..Default::default()
        })
    }

    async fn list_projects(&self, limit: QueryLimit) -> Result<Vec<StoredProject>> {
        Ok(self
            .inserted
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit.get() as usize)
            .map(|r| StoredProject {
                name: r.name.clone(),
                idea: r.idea.clone(),
                code: r.code.clone(),
                stack: r.stack.clone(),
                timestamp: 0,
            })
            .collect())
    }
}

/// Fallback store that counts writes and delegates to an in-memory SQLite
/// store, or fails.
pub struct CountingFallback {
    pub inner: LocalStore,
    writes: AtomicUsize,
    fail: bool,
}

impl CountingFallback {
    pub fn new() -> Self {
        Self {
            inner: LocalStore::in_memory().unwrap(),
            writes: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl FallbackStore for CountingFallback {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Store("disk full".into()));
        }
        self.inner.put(key, value)
    }
}

/// Everything a test needs to inspect after running a factory.
pub struct Harness {
    pub llm: Arc<ScriptedLlm>,
    pub store: Arc<FakeStore>,
    pub fallback: Arc<CountingFallback>,
    pub events: Arc<Recorder>,
    pub factory: Factory,
}

impl Harness {
    pub fn new(llm: ScriptedLlm, store: FakeStore, fallback: CountingFallback) -> Self {
        Self::with_config(llm, store, fallback, FactoryConfig::default())
    }

    pub fn with_config(
        llm: ScriptedLlm,
        store: FakeStore,
        fallback: CountingFallback,
        config: FactoryConfig,
    ) -> Self {
        let llm = Arc::new(llm);
        let store = Arc::new(store);
        let fallback = Arc::new(fallback);
        let events = Arc::new(Recorder::new());
        let factory = Factory::new(
            llm.clone(),
            store.clone(),
            fallback.clone(),
            events.clone(),
            config,
        );
        Self {
            llm,
            store,
            fallback,
            events,
            factory,
        }
    }

    pub fn happy() -> Self {
        Self::new(ScriptedLlm::happy(), FakeStore::new(), CountingFallback::new())
    }
}
