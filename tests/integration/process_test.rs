// tests/integration/process_test.rs

use super::test_helpers::{
    FakeBackend, FakeTransport, SequenceIds, client, controller, init_tracing, server_responder,
};
use launchsite::core::rcon::ConnectionState;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_start_reports_running_process() {
    init_tracing();
    let backend = FakeBackend::new();
    let rcon = client(FakeTransport::new(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::ZERO);

    assert!(controller.start().await);
    assert!(controller.is_running());
    // Already running: no second spawn.
    assert!(controller.start().await);
    assert_eq!(backend.spawns(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_fails_when_spawn_fails() {
    init_tracing();
    let backend = FakeBackend::new();
    backend.fail_spawn.store(true, Ordering::SeqCst);
    let rcon = client(FakeTransport::new(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::ZERO);

    assert!(!controller.start().await);
    assert!(!controller.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_start_gives_up_on_process_that_never_runs() {
    init_tracing();
    let backend = FakeBackend::with(true, true);
    let rcon = client(FakeTransport::new(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::ZERO);

    let started = Instant::now();
    assert!(!controller.start().await);
    // Three polls, two sleeps between them.
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(backend.events(), vec!["terminate"]);
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_holds_shutdown_while_players_remain() {
    init_tracing();
    let backend = FakeBackend::new();
    let transport = FakeTransport::new();

    let quit_at = Arc::new(Mutex::new(None));
    let respond = server_responder(backend.log.clone(), 3);
    let quit_clock = quit_at.clone();
    transport.respond_with(move |command| {
        if command.message == "quit" {
            *quit_clock.lock() = Some(Instant::now());
        }
        respond(command)
    });

    let rcon = client(transport.clone(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::from_secs(30));
    assert!(controller.start().await);

    let started = Instant::now();
    controller.stop("maintenance").await;

    let quit_at = (*quit_at.lock()).expect("quit was never sent");
    assert!(quit_at.duration_since(started) >= Duration::from_secs(30));
    assert!(!controller.is_running());
    assert_eq!(backend.events(), vec!["quit"]);

    let announcements: Vec<String> = transport
        .sent()
        .into_iter()
        .filter(|command| command.message.starts_with("say "))
        .map(|command| command.message)
        .collect();
    assert_eq!(
        announcements.first().map(String::as_str),
        Some("say *** Shutdown in 30 second(s) for reason: maintenance")
    );
    assert_eq!(
        announcements.last().map(String::as_str),
        Some("say *** Shutdown in 1 second(s) for reason: maintenance")
    );
    // 30, 20, then every second from 10 down to 1.
    assert_eq!(announcements.len(), 12);
    assert!(
        transport
            .sent()
            .iter()
            .filter(|command| command.message.starts_with("say "))
            .all(|command| command.identifier == 0)
    );
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_ends_early_when_server_is_empty() {
    init_tracing();
    let backend = FakeBackend::new();
    let transport = FakeTransport::new();
    transport.respond_with(server_responder(backend.log.clone(), 0));
    let rcon = client(transport.clone(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::from_secs(300));
    assert!(controller.start().await);

    let started = Instant::now();
    controller.stop("restart").await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(
        !transport
            .sent()
            .iter()
            .any(|command| command.message.starts_with("say "))
    );
    assert_eq!(backend.events(), vec!["quit"]);
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_ends_early_when_serverinfo_is_unusable() {
    init_tracing();
    let backend = FakeBackend::new();
    let transport = FakeTransport::new();
    let respond = server_responder(backend.log.clone(), 0);
    transport.respond_with(move |command| match command.message.as_str() {
        "serverinfo" => Some("not json".to_string()),
        _ => respond(command),
    });
    let rcon = client(transport.clone(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::from_secs(600));
    assert!(controller.start().await);

    let started = Instant::now();
    controller.stop("update").await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(
        !transport
            .sent()
            .iter()
            .any(|command| command.message.starts_with("say "))
    );
    assert_eq!(backend.events(), vec!["quit"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_escalates_only_when_previous_step_fails() {
    init_tracing();
    // Ignores quit and interrupts.
    let backend = FakeBackend::with(false, false);
    let transport = FakeTransport::new();
    let log = backend.log.clone();
    transport.respond_with(move |command| {
        if command.message == "quit" {
            log.lock().events.push("quit");
        }
        Some(String::new())
    });
    let rcon = client(transport, SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::ZERO);
    assert!(controller.start().await);

    controller.stop("stubborn").await;

    assert_eq!(backend.events(), vec!["quit", "interrupt", "terminate"]);
    assert!(!controller.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_stop_uses_interrupt_when_rcon_is_down() {
    init_tracing();
    let backend = FakeBackend::new();
    let transport = FakeTransport::new();
    transport.set_state(ConnectionState::Disconnected);
    let rcon = client(transport.clone(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::from_secs(30));
    assert!(controller.start().await);

    let started = Instant::now();
    controller.stop("no console").await;

    // No grace period without a console to announce it on.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(backend.events(), vec!["interrupt"]);
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_releases_a_crashed_process() {
    init_tracing();
    let backend = FakeBackend::new();
    let rcon = client(FakeTransport::new(), SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::ZERO);
    assert!(controller.start().await);

    backend.crash();
    assert!(!controller.is_running());
    controller.stop("gone").await;

    assert!(backend.events().is_empty());
    assert!(controller.start().await);
    assert_eq!(backend.spawns(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_query_parses_serverinfo_reply() {
    init_tracing();
    let backend = FakeBackend::new();
    let transport = FakeTransport::new();
    transport.respond_with(server_responder(backend.log.clone(), 12));
    let rcon = client(transport, SequenceIds::new(vec![]));
    let mut controller = controller(backend.clone(), rcon, Duration::ZERO);

    // Not running yet.
    assert!(!controller.query().await.valid);

    assert!(controller.start().await);
    let snapshot = controller.query().await;
    assert!(snapshot.valid);
    assert_eq!(snapshot.players, 12);
    assert_eq!(snapshot.protocol, "2593.216.1");
}

#[tokio::test(start_paused = true)]
async fn test_send_command_passes_through_to_rcon() {
    init_tracing();
    let backend = FakeBackend::new();
    let transport = FakeTransport::new();
    transport.respond_with(|command| Some(format!("ran {}", command.message)));
    let rcon = client(transport.clone(), SequenceIds::new(vec![]));
    let controller = controller(backend, rcon, Duration::ZERO);

    assert_eq!(
        controller
            .send_command("oxide.reload *", Duration::from_secs(5))
            .await,
        "ran oxide.reload *"
    );
    assert_eq!(controller.send_command("say hi", Duration::ZERO).await, "");
    assert_eq!(transport.sent_count(), 2);
    assert!(controller.rcon().is_connected());
}
