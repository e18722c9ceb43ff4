//! End-to-end tests of message routing through the controller.
//!
//! These drive a [`Controller`] by hand (no runtime, no timers):
//! - `hears` matching, `heard` middleware and error isolation
//! - answers routed back into waiting conversations
//! - task completion across several conversations
//! - multi-user capture on a broadcast question

mod common;

use anyhow::anyhow;
use parley_core::{
    Bot, CaptureOptions, Controller, ConversationRef, Flow, Handler, IncomingMessage,
    MatchResult, Matcher, Next, Payload, Status, events,
};
use std::sync::{Arc, Mutex};

use common::{BroadcastBot, TestBot, message};

fn counter(controller: &mut Controller, event: &str) -> Arc<Mutex<Vec<Payload>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.on(event, move |_, payload| {
        sink.lock().unwrap().push(payload.clone());
        Flow::Continue
    });
    seen
}

/// A greeting starts a conversation, the answer is captured, and every
/// lifecycle event fires once.
#[test]
fn test_hears_starts_conversation_and_captures_answer() {
    let mut controller = Controller::default();
    controller.hears(
        &["^hello$", "^hi$"],
        &[events::MESSAGE_RECEIVED],
        |controller, bot, message| {
            controller.start_conversation(Arc::clone(bot), message.clone(), |convo| {
                convo.ask(
                    "Name?",
                    Handler::simple(|_, convo| {
                        convo.say("Nice to meet you, {{responses.name}}");
                        convo.next();
                        Ok(())
                    }),
                    Some(CaptureOptions::key("name")),
                );
            });
            Ok(())
        },
    );
    let generic = counter(&mut controller, events::MESSAGE_RECEIVED);
    let heard = counter(&mut controller, events::HEARD_TRIGGER);
    let started = counter(&mut controller, events::CONVERSATION_STARTED);
    let ended = counter(&mut controller, events::CONVERSATION_ENDED);
    let task_ended = counter(&mut controller, events::TASK_ENDED);

    let bot = Arc::new(TestBot::default());
    controller.receive_message(bot.clone(), message("U1", "Hello"));
    assert_eq!(heard.lock().unwrap().len(), 1);
    assert!(generic.lock().unwrap().is_empty());
    assert_eq!(started.lock().unwrap().len(), 1);

    controller.tick();
    assert_eq!(bot.texts(), vec!["Name?"]);

    controller.receive_message(bot.clone(), message("U1", " Ada "));
    controller.tick();
    assert_eq!(bot.texts(), vec!["Name?", "Nice to meet you, Ada"]);
    assert!(ended.lock().unwrap().is_empty());

    // the reply is acked, then the conversation completes
    controller.tick();

    let ended = ended.lock().unwrap();
    assert_eq!(ended.len(), 1);
    match &ended[0] {
        Payload::Conversation(summary) => {
            assert_eq!(summary.status, Status::Completed);
            assert_eq!(summary.responses["name"], "Ada");
        }
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(task_ended.lock().unwrap().len(), 1);
    assert!(controller.tasks().is_empty());

    // nothing is waiting any more, so this reaches the generic handler
    controller.receive_message(bot, message("U1", "anyone there?"));
    assert_eq!(generic.lock().unwrap().len(), 1);
}

/// A failing `heard` step is reported to the error chain exactly once and the
/// `hears` callback never runs.
#[test]
fn test_heard_middleware_error_is_isolated() {
    let mut controller = Controller::default();
    let called = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&called);
    controller.hears(&["hello"], &[events::MESSAGE_RECEIVED], move |_, _, _| {
        *flag.lock().unwrap() = true;
        Ok(())
    });
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    controller
        .middleware_mut()
        .heard
        .add(|_, _| Err(anyhow!("heard step exploded")));
    controller.middleware_mut().error.add(move |_, err, msg| {
        sink.lock()
            .unwrap()
            .push((format!("{err:#}"), msg.map(|m| m.text().to_string())));
        Ok(Next::Continue)
    });
    let heard = counter(&mut controller, events::HEARD_TRIGGER);

    controller.receive_message(Arc::new(TestBot::default()), message("U1", "hello there"));

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("heard step exploded"));
    assert_eq!(errors[0].1.as_deref(), Some("hello there"));
    assert!(!*called.lock().unwrap());
    assert!(heard.lock().unwrap().is_empty());
}

/// Errors returned by a `hears` callback go to the error chain as well.
#[test]
fn test_hears_callback_error_reaches_error_chain() {
    let mut controller = Controller::default();
    controller.hears(&["boom"], &[events::MESSAGE_RECEIVED], |_, _, _| {
        Err(anyhow!("callback failed"))
    });
    let errors = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&errors);
    controller.middleware_mut().error.add(move |_, _, _| {
        *sink.lock().unwrap() += 1;
        Ok(Next::Continue)
    });

    controller.receive_message(Arc::new(TestBot::default()), message("U1", "boom"));
    assert_eq!(*errors.lock().unwrap(), 1);
}

/// Two users answer one broadcast question; the second answer is prefixed
/// with its author.
#[test]
fn test_multi_user_capture_on_broadcast_question() {
    let mut controller = Controller::default();
    let bot = Arc::new(BroadcastBot::default());
    let address = controller.start_conversation(bot.clone(), message("U1", "standup"), |convo| {
        convo.ask(
            "What did you do yesterday?",
            Handler::simple(|_, _| Ok(())),
            Some(CaptureOptions::key("yesterday").multiple()),
        );
    });
    controller.tick();

    controller.receive_message(bot.clone(), message("U1", "shipped the parser"));
    controller.receive_message(bot.clone(), message("U2", "fixed the build"));

    let convo = controller.conversation(address).unwrap();
    assert_eq!(
        convo.extract_response("yesterday"),
        "shipped the parser\n<@U2>: fixed the build"
    );
    assert_eq!(bot.inner.texts(), vec!["What did you do yesterday?"]);
}

/// A task completes exactly once, when its last conversation stops.
#[test]
fn test_task_completes_when_last_conversation_stops() {
    let mut controller = Controller::default();
    let bot: Arc<dyn Bot> = Arc::new(TestBot::default());
    let task_id = controller.start_task(bot, message("U0", "roll call"), |task| {
        for user in ["U1", "U2", "U3", "U4"] {
            task.start_conversation(message(user, "roll call")).ask(
                "Here?",
                Handler::simple(|_, _| Ok(())),
                None,
            );
        }
    });
    let ended = counter(&mut controller, events::CONVERSATION_ENDED);
    let task_ended = counter(&mut controller, events::TASK_ENDED);
    controller.tick();

    let addresses: Vec<ConversationRef> = controller
        .task(task_id)
        .unwrap()
        .conversations()
        .iter()
        .map(parley_core::Conversation::address)
        .collect();
    for (n, address) in addresses.iter().enumerate() {
        let convo = controller.conversation_mut(*address).unwrap();
        convo.stop(Status::Stopped);
        convo.stop(Status::Stopped);
        controller.tick();

        assert_eq!(ended.lock().unwrap().len(), n + 1);
        if n + 1 < addresses.len() {
            assert!(task_ended.lock().unwrap().is_empty());
            assert!(controller.task(task_id).is_some_and(parley_core::Task::is_active));
        }
    }
    assert_eq!(task_ended.lock().unwrap().len(), 1);
    assert!(controller.task(task_id).is_none());
}

/// `receive` middleware can rewrite, hold or reject a message before routing.
#[test]
fn test_receive_middleware_rewrites_holds_and_rejects() {
    let mut controller = Controller::default();
    controller.middleware_mut().receive.add(|_, msg| {
        let text = msg.text().to_string();
        match text.as_str() {
            "bad" => Err(anyhow!("rejected")),
            "quiet" => Ok(Next::Halt),
            t if t.starts_with('/') => {
                msg.kind = Some("slash_command".to_string());
                Ok(Next::Continue)
            }
            _ => Ok(Next::Continue),
        }
    });
    let generic = counter(&mut controller, events::MESSAGE_RECEIVED);
    let commands = counter(&mut controller, "slash_command");
    let bot: Arc<dyn Bot> = Arc::new(TestBot::default());

    controller.receive_message(Arc::clone(&bot), message("U1", "bad"));
    controller.receive_message(Arc::clone(&bot), message("U1", "quiet"));
    assert!(generic.lock().unwrap().is_empty());

    controller.receive_message(Arc::clone(&bot), message("U1", "/help"));
    controller.receive_message(bot, message("U1", "plain"));
    assert_eq!(commands.lock().unwrap().len(), 1);
    assert_eq!(generic.lock().unwrap().len(), 1);
}

#[derive(Debug)]
struct ExactMatcher;

impl Matcher for ExactMatcher {
    fn test(&self, patterns: &[String], message: &IncomingMessage) -> MatchResult {
        patterns
            .iter()
            .find(|p| p.as_str() == message.text())
            .map(|p| MatchResult {
                matched: Some(p.clone()),
                captures: vec![p.clone()],
            })
            .unwrap_or_default()
    }
}

/// Swapping the matcher changes what `hears` and pattern branches accept.
#[test]
fn test_change_ears_replaces_matcher() {
    let mut controller = Controller::default();
    controller.change_ears(ExactMatcher);
    controller.hears(&["Hello"], &[events::MESSAGE_RECEIVED], |controller, bot, msg| {
        controller.start_conversation(Arc::clone(bot), msg.clone(), |convo| convo.say("matched"));
        Ok(())
    });
    let bot = Arc::new(TestBot::default());

    controller.receive_message(bot.clone(), message("U1", "hello"));
    controller.tick();
    assert!(bot.texts().is_empty());

    controller.receive_message(bot.clone(), message("U1", "Hello"));
    controller.tick();
    assert_eq!(bot.texts(), vec!["matched"]);
}

/// A per-`hears` test overrides the controller matcher for that registration
/// only.
#[test]
fn test_hears_with_custom_test() {
    let mut controller = Controller::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.hears_with(
        &["long"],
        &[events::MESSAGE_RECEIVED],
        |_, message| {
            if message.text().len() > 10 {
                MatchResult {
                    matched: Some("long".to_string()),
                    captures: vec![message.text().to_string()],
                }
            } else {
                MatchResult::default()
            }
        },
        move |_, _, message| {
            sink.lock().unwrap().push(message.matches.clone());
            Ok(())
        },
    );
    let bot: Arc<dyn Bot> = Arc::new(TestBot::default());

    controller.receive_message(Arc::clone(&bot), message("U1", "short"));
    controller.receive_message(bot, message("U1", "a much longer message"));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![vec!["a much longer message".to_string()]]
    );
}

/// Pattern branches get the regex captures of the branch that matched.
#[test]
fn test_hears_passes_captures_to_callback() {
    let mut controller = Controller::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    controller.hears(
        &["call me (\\w+)"],
        &[events::MESSAGE_RECEIVED],
        move |_, _, message| {
            sink.lock().unwrap().extend(message.matches.clone());
            Ok(())
        },
    );
    controller.receive_message(Arc::new(TestBot::default()), message("U1", "Call me Ishmael"));
    assert_eq!(*seen.lock().unwrap(), vec!["Call me Ishmael", "Ishmael"]);
}
