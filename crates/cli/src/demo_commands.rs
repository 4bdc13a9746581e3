//! Runnable scenarios showing a sender and receiver wired over one channel.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    anyhow::Result,
    async_trait::async_trait,
    clap::ValueEnum,
    missive::{
        ChannelDirectory, Configurator, Handler, Message, MessageOptions, Receiver, Retry, Return,
        Sender, Throw, Timeout, connect,
    },
    missive_config::MediatorConfig,
    serde::{Deserialize, Serialize},
    tracing::info,
};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum Scenario {
    /// One message type, one handler.
    #[default]
    Basic,
    /// Renamed and namespaced types with per-message interceptors.
    Fluent,
    /// Sender-side `Return` and `Throw` standing in for a missing receiver.
    Mocked,
    /// Retry and timeout around an unreliable handler.
    Resilience,
}

pub async fn run(scenario: Scenario, config: &MediatorConfig) -> Result<()> {
    let directory = Arc::new(ChannelDirectory::new());
    let (sender, receiver) = connect(config, &directory)?;
    info!(?scenario, channel = %config.channel, "running demo");

    match scenario {
        Scenario::Basic => basic(&sender, &receiver).await,
        Scenario::Fluent => fluent(&sender, &receiver).await,
        Scenario::Mocked => mocked(&sender).await,
        Scenario::Resilience => resilience(&sender, &receiver).await,
    }
}

// ── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct Greet {
    subject: String,
}

impl Message for Greet {
    type Output = String;
}

struct Greeter;

#[async_trait]
impl Handler<Greet> for Greeter {
    async fn handle(&self, message: Greet) -> Result<String> {
        Ok(format!("Hello, {}!", message.subject))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Sum {
    values: Vec<i64>,
}

impl Message for Sum {
    type Output = i64;
}

struct Adder;

#[async_trait]
impl Handler<Sum> for Adder {
    async fn handle(&self, message: Sum) -> Result<i64> {
        Ok(message.values.iter().sum())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Fetch {
    latency_ms: u64,
}

impl Message for Fetch {
    type Output = usize;
}

/// Sleeps before answering; fails every call before `succeed_on`.
struct Unreliable {
    calls: AtomicUsize,
    succeed_on: usize,
}

#[async_trait]
impl Handler<Fetch> for Unreliable {
    async fn handle(&self, message: Fetch) -> Result<usize> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(message.latency_ms)).await;
        if call < self.succeed_on {
            anyhow::bail!("upstream unavailable (call {call})");
        }
        Ok(call)
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────────

async fn basic(sender: &Sender, receiver: &Receiver) -> Result<()> {
    receiver.configure(&Configurator::receiver().handler::<Greet, _>(Greeter));

    let reply = sender
        .submit(Greet {
            subject: "world".into(),
        })
        .await?;
    println!("{reply}");
    Ok(())
}

async fn fluent(sender: &Sender, receiver: &Receiver) -> Result<()> {
    let options = MessageOptions::default()
        .with_name("greeting")
        .with_namespace("demo");

    receiver.configure(
        &Configurator::receiver()
            .message_with::<Greet>(options.clone())
            .handle_with(Greeter)
            .message::<Sum>()
            .handle_with_factory(|| Some(Adder))
            .done(),
    );
    sender.configure(
        &Configurator::sender()
            .message_with::<Greet>(options)
            .message::<Sum>()
            .intercept(Timeout::from_millis(1_000)),
    );

    println!("routes: {}", receiver.message_types().join(", "));
    let reply = sender
        .submit(Greet {
            subject: "fluent world".into(),
        })
        .await?;
    println!("{} -> {reply}", sender.message_type::<Greet>());
    let total = sender
        .submit(Sum {
            values: vec![1, 2, 3, 4],
        })
        .await?;
    println!("{} -> {total}", sender.message_type::<Sum>());
    Ok(())
}

async fn mocked(sender: &Sender) -> Result<()> {
    sender.configure(
        &Configurator::sender()
            .message::<Sum>()
            .intercept(Return::new(42))
            .message::<Greet>()
            .intercept(Throw::message("greetings are disabled")),
    );

    let total = sender.submit(Sum { values: vec![] }).await?;
    println!("mocked sum: {total}");
    match sender
        .submit(Greet {
            subject: "nobody".into(),
        })
        .await
    {
        Ok(reply) => println!("unexpected reply: {reply}"),
        Err(e) => println!("rejected: {e}"),
    }
    Ok(())
}

async fn resilience(sender: &Sender, receiver: &Receiver) -> Result<()> {
    receiver.configure(&Configurator::receiver().handler::<Fetch, _>(Unreliable {
        calls: AtomicUsize::new(0),
        succeed_on: 3,
    }));
    sender.configure(
        &Configurator::sender()
            .message::<Fetch>()
            .intercept(Retry::new(3))
            .intercept(Timeout::from_millis(200)),
    );

    let calls = sender.submit(Fetch { latency_ms: 20 }).await?;
    println!("succeeded on call {calls}");

    match sender.submit(Fetch { latency_ms: 500 }).await {
        Ok(calls) => println!("succeeded on call {calls}"),
        Err(e) => println!("gave up: {e}"),
    }
    Ok(())
}
