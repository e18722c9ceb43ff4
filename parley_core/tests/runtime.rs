//! Tests for the async runtime driver.

mod common;

use parley_core::{Controller, ControllerConfig, Error, Runtime, events};
use std::sync::Arc;
use std::time::Duration;

use common::{TestBot, message};

fn fast_controller() -> Controller {
    Controller::new(ControllerConfig {
        tick_interval: Duration::from_millis(5),
        ..ControllerConfig::default()
    })
}

async fn wait_for_replies(bot: &TestBot, count: usize) {
    for _ in 0..200 {
        if bot.texts().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Messages sent through the handle are routed and answered on later ticks.
#[tokio::test]
async fn test_runtime_routes_and_ticks() {
    let mut controller = fast_controller();
    controller.hears(&["hello"], &[events::MESSAGE_RECEIVED], |controller, bot, msg| {
        controller.start_conversation(Arc::clone(bot), msg.clone(), |convo| {
            convo.say("hi there");
            convo.say("bye");
        });
        Ok(())
    });
    let (runtime, handle) = Runtime::new(controller);
    let driver = tokio::spawn(runtime.run());

    let bot = Arc::new(TestBot::default());
    handle.start_ticking().unwrap();
    handle.receive(bot.clone(), message("U1", "hello")).unwrap();
    wait_for_replies(&bot, 2).await;
    assert_eq!(bot.texts(), vec!["hi there", "bye"]);
    // a few more ticks to apply the last ack and sweep the task
    tokio::time::sleep(Duration::from_millis(50)).await;

    handle.shutdown().unwrap();
    let controller = driver.await.unwrap();
    assert!(!controller.is_ticking());
    assert!(controller.tasks().is_empty());
}

/// Nothing is sent until ticking is switched on.
#[tokio::test]
async fn test_runtime_does_not_tick_until_started() {
    let (runtime, handle) = Runtime::new(fast_controller());
    let driver = tokio::spawn(runtime.run());
    let bot = Arc::new(TestBot::default());

    let target = bot.clone();
    handle
        .call(move |controller| {
            controller.start_conversation(target, message("U1", "ping"), |convo| convo.say("pong"));
        })
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(bot.texts().is_empty());

    handle.start_ticking().unwrap();
    wait_for_replies(&bot, 1).await;
    assert_eq!(bot.texts(), vec!["pong"]);

    handle.shutdown().unwrap();
    driver.await.unwrap();
}

/// Once the runtime has stopped, the handle reports it.
#[tokio::test]
async fn test_handle_fails_after_shutdown() {
    let (runtime, handle) = Runtime::new(fast_controller());
    let driver = tokio::spawn(runtime.run());
    handle.shutdown().unwrap();
    driver.await.unwrap();

    let err = handle
        .receive(Arc::new(TestBot::default()), message("U1", "late"))
        .unwrap_err();
    assert!(matches!(err, Error::RuntimeClosed));
}

/// A zero tick interval is raised to the minimum instead of panicking.
#[tokio::test]
async fn test_runtime_accepts_zero_tick_interval() {
    let mut controller = Controller::new(ControllerConfig {
        tick_interval: Duration::ZERO,
        ..ControllerConfig::default()
    });
    controller.hears(&["ping"], &[events::MESSAGE_RECEIVED], |controller, bot, msg| {
        controller.start_conversation(Arc::clone(bot), msg.clone(), |convo| convo.say("pong"));
        Ok(())
    });
    let (runtime, handle) = Runtime::new(controller);
    let driver = tokio::spawn(runtime.run());

    let bot = Arc::new(TestBot::default());
    handle.start_ticking().unwrap();
    handle.receive(bot.clone(), message("U1", "ping")).unwrap();
    wait_for_replies(&bot, 1).await;
    assert_eq!(bot.texts(), vec!["pong"]);

    handle.shutdown().unwrap();
    driver.await.unwrap();
}
