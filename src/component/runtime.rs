//! The message-driven state loop.
//!
//! A [`Component`] owns one single-consumer processing loop: messages are
//! drained from an unbounded queue one at a time, the pure `update`
//! function computes the next state and a set of commands, and each command
//! is spawned against the resolver as an independent task whose resulting
//! messages feed back into the same queue. At most one `update` invocation
//! and one state mutation happen at a time per instance.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use super::resolver::{Resolver, ResolverFailure};

/// One observed state change: the message that caused it and the states on
/// either side.
#[derive(Debug)]
pub struct Transition<S, M> {
    pub message: Arc<M>,
    pub old_state: Arc<S>,
    pub new_state: Arc<S>,
}

impl<S, M> Clone for Transition<S, M> {
    fn clone(&self) -> Self {
        Self {
            message: Arc::clone(&self.message),
            old_state: Arc::clone(&self.old_state),
            new_state: Arc::clone(&self.new_state),
        }
    }
}

enum Input<S, M> {
    Message(M),
    Replace(S),
}

/// Builder for a [`Component`].
pub struct ComponentBuilder<S, M, C> {
    initial_state: S,
    initial_commands: Vec<C>,
    update: Box<dyn Fn(&M, &S) -> (S, Vec<C>) + Send + Sync>,
    resolver: Arc<dyn Resolver<C, M>>,
    failure_message: Arc<dyn Fn(ResolverFailure) -> M + Send + Sync>,
    subscription_capacity: usize,
}

impl<S, M, C> ComponentBuilder<S, M, C>
where
    S: Send + Sync + 'static,
    M: Send + Sync + 'static,
    C: Send + 'static,
{
    /// Commands dispatched once at startup, before any message is processed.
    pub fn with_initial_commands(mut self, commands: Vec<C>) -> Self {
        self.initial_commands = commands;
        self
    }

    /// Buffer size of the `states()`/`transitions()` subscriptions.
    ///
    /// A subscriber that lags further than this sees a gap, not stale data;
    /// the runtime's own state is unaffected.
    pub fn with_subscription_capacity(mut self, capacity: usize) -> Self {
        self.subscription_capacity = capacity;
        self
    }

    /// Start the processing loop and return the handle.
    pub fn spawn(self) -> Component<S, M> {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (states_tx, _) = broadcast::channel(self.subscription_capacity);
        let (transitions_tx, _) = broadcast::channel(self.subscription_capacity);
        let initial = Arc::new(self.initial_state);
        let (latest_tx, latest_rx) = watch::channel(Arc::clone(&initial));

        let worker = Worker {
            state: initial,
            update: self.update,
            resolver: self.resolver,
            failure_message: self.failure_message,
            feedback: input_tx.downgrade(),
            states_tx: states_tx.clone(),
            transitions_tx: transitions_tx.clone(),
            latest_tx,
        };
        tokio::spawn(worker.run(input_rx, self.initial_commands));

        Component {
            input_tx,
            states_tx,
            transitions_tx,
            latest_rx,
        }
    }
}

/// Handle to a running component.
///
/// Cloning the handle does not clone the loop; all clones feed the same
/// queue. The loop stops once every handle is dropped and the queue drains.
pub struct Component<S, M> {
    input_tx: mpsc::UnboundedSender<Input<S, M>>,
    states_tx: broadcast::Sender<Arc<S>>,
    transitions_tx: broadcast::Sender<Transition<S, M>>,
    latest_rx: watch::Receiver<Arc<S>>,
}

impl<S, M> Clone for Component<S, M> {
    fn clone(&self) -> Self {
        Self {
            input_tx: self.input_tx.clone(),
            states_tx: self.states_tx.clone(),
            transitions_tx: self.transitions_tx.clone(),
            latest_rx: self.latest_rx.clone(),
        }
    }
}

impl<S, M> Component<S, M>
where
    S: Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    /// Build a component from its TEA contract: initial state, pure update,
    /// resolver, and the hook turning a resolver fault into a message.
    pub fn builder<C>(
        initial_state: S,
        update: impl Fn(&M, &S) -> (S, Vec<C>) + Send + Sync + 'static,
        resolver: Arc<dyn Resolver<C, M>>,
        failure_message: impl Fn(ResolverFailure) -> M + Send + Sync + 'static,
    ) -> ComponentBuilder<S, M, C>
    where
        C: Send + 'static,
    {
        ComponentBuilder {
            initial_state,
            initial_commands: Vec::new(),
            update: Box::new(update),
            resolver,
            failure_message: Arc::new(failure_message),
            subscription_capacity: 256,
        }
    }

    /// Enqueue a message. The queue is unbounded and never drops; back
    /// pressure is the caller's responsibility.
    pub fn send(&self, message: M) {
        if self.input_tx.send(Input::Message(message)).is_err() {
            tracing::warn!("message sent to a stopped component was discarded");
        }
    }

    /// Replace the current state, bypassing `update` entirely.
    ///
    /// The replacement is applied by the loop itself, so it is atomic with
    /// respect to message processing. Observed on `states()` but emits no
    /// transition.
    pub fn set_state(&self, state: S) {
        if self.input_tx.send(Input::Replace(state)).is_err() {
            tracing::warn!("state pushed to a stopped component was discarded");
        }
    }

    /// Subscribe to state values, one per change, broadcast semantics:
    /// subscribers only observe changes from subscription time on.
    pub fn states(&self) -> broadcast::Receiver<Arc<S>> {
        self.states_tx.subscribe()
    }

    /// Subscribe to `(message, old state, new state)` transitions.
    pub fn transitions(&self) -> broadcast::Receiver<Transition<S, M>> {
        self.transitions_tx.subscribe()
    }

    /// Watch holding the most recent state.
    pub fn latest(&self) -> watch::Receiver<Arc<S>> {
        self.latest_rx.clone()
    }

    /// The current state at the time of the call.
    pub fn current_state(&self) -> Arc<S> {
        Arc::clone(&self.latest_rx.borrow())
    }
}

struct Worker<S, M, C> {
    state: Arc<S>,
    update: Box<dyn Fn(&M, &S) -> (S, Vec<C>) + Send + Sync>,
    resolver: Arc<dyn Resolver<C, M>>,
    failure_message: Arc<dyn Fn(ResolverFailure) -> M + Send + Sync>,
    // Weak so in-flight resolver tasks never keep the loop alive on their
    // own; their results are discarded once the component is gone.
    feedback: mpsc::WeakUnboundedSender<Input<S, M>>,
    states_tx: broadcast::Sender<Arc<S>>,
    transitions_tx: broadcast::Sender<Transition<S, M>>,
    latest_tx: watch::Sender<Arc<S>>,
}

impl<S, M, C> Worker<S, M, C>
where
    S: Send + Sync + 'static,
    M: Send + Sync + 'static,
    C: Send + 'static,
{
    async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<Input<S, M>>, initial: Vec<C>) {
        for command in initial {
            self.dispatch(command);
        }

        while let Some(input) = input_rx.recv().await {
            match input {
                Input::Message(message) => self.apply(message),
                Input::Replace(state) => {
                    self.state = Arc::new(state);
                    self.publish_state();
                    tracing::debug!("state replaced externally, update bypassed");
                }
            }
        }
    }

    fn apply(&mut self, message: M) {
        let (next, commands) = (self.update)(&message, &self.state);
        let old_state = std::mem::replace(&mut self.state, Arc::new(next));
        self.publish_state();
        let _ = self.transitions_tx.send(Transition {
            message: Arc::new(message),
            old_state,
            new_state: Arc::clone(&self.state),
        });
        for command in commands {
            self.dispatch(command);
        }
    }

    fn publish_state(&self) {
        self.latest_tx.send_replace(Arc::clone(&self.state));
        let _ = self.states_tx.send(Arc::clone(&self.state));
    }

    /// Submit one command as an independent resolver task.
    fn dispatch(&self, command: C) {
        let resolver = Arc::clone(&self.resolver);
        let failure_message = Arc::clone(&self.failure_message);
        let feedback = self.feedback.clone();

        tokio::spawn(async move {
            let messages = match resolver.resolve(command).await {
                Ok(messages) => messages,
                Err(failure) => {
                    tracing::warn!(%failure, "resolver failed, converting to message");
                    vec![failure_message(failure)]
                }
            };

            if let Some(feedback) = feedback.upgrade() {
                for message in messages {
                    let _ = feedback.send(Input::Message(message));
                }
            }
        });
    }
}
