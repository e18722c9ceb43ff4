//! The demo onboarding script every connector runs.

use parley_core::{
    CaptureOptions, Controller, Conversation, DeliveryAck, Flow, Handler, OutgoingMessage,
    PatternBranch, Payload, TIMEOUT_THREAD, events,
};
use std::sync::Arc;
use tracing::info;

const GREETING: &str = "^(hello|hi|hey)\\b";
const HINT: &str = "Say hello to start a conversation.";

/// Register the greeting trigger, the unmatched-message hint and the
/// lifecycle log lines.
pub fn install(controller: &mut Controller) {
    controller.hears(
        &[GREETING],
        &[events::MESSAGE_RECEIVED],
        |controller, bot, msg| {
            controller.start_conversation(Arc::clone(bot), msg.clone(), onboarding);
            Ok(())
        },
    );

    // runs only when no `hears` claimed the message
    controller.on(events::MESSAGE_RECEIVED, |_, payload| {
        if let Payload::Message { bot, message } = payload {
            bot.reply(
                message,
                OutgoingMessage::text(message.channel.clone(), HINT),
                DeliveryAck::detached(),
            );
        }
        Flow::Continue
    });

    controller.on(events::CONVERSATION_ENDED, |_, payload| {
        if let Payload::Conversation(summary) = payload {
            info!(
                "Conversation {} with {} ended as {} after {} message(s)",
                summary.id, summary.source.user, summary.status, summary.sent
            );
        }
        Flow::Continue
    });
}

fn onboarding(convo: &mut Conversation) {
    convo.say("Hi, I'm {{ identity.name }}.");
    convo.ask(
        "What should I call you?",
        Handler::simple(|_, convo| {
            convo.next();
            Ok(())
        }),
        Some(CaptureOptions::key("name")),
    );
    convo.ask(
        "Nice to meet you, {{ responses.name }}! Do you write Rust? (yes/no)",
        Handler::patterns(vec![
            PatternBranch::pattern("^(yes|yeah|yep|sure)\\b", |_, convo| {
                convo.goto_thread("yes");
                Ok(())
            }),
            PatternBranch::pattern("^(no|nope|nah)\\b", |_, convo| {
                convo.transition_to("no", "No worries.");
                Ok(())
            }),
            PatternBranch::fallback(|_, convo| {
                convo.say("Please answer yes or no.");
                convo.repeat();
                convo.next();
                Ok(())
            }),
        ]),
        Some(CaptureOptions::key("rust")),
    );

    convo.add_message(
        "Then we have plenty to talk about, {{ responses.name }}.",
        Some("yes"),
    );
    convo.add_message(
        "Maybe give it a try some day, {{ responses.name }}.",
        Some("no"),
    );
    convo.add_message(
        "You went quiet, so I'll stop here. Say hello to start over.",
        Some(TIMEOUT_THREAD),
    );

    convo.on_end(|convo| {
        info!(
            "Onboarding {} finished: {:?}",
            convo.id(),
            convo.extract_responses()
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{
        Bot, ControllerConfig, ConversationSummary, Identity, IncomingMessage, ManualClock, Status,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBot {
        texts: Mutex<Vec<String>>,
    }

    impl RecordingBot {
        fn texts(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }
    }

    impl Bot for RecordingBot {
        fn identity(&self) -> Identity {
            Identity {
                id: "B1".to_string(),
                name: "parley".to_string(),
            }
        }

        fn reply(&self, _source: &IncomingMessage, message: OutgoingMessage, ack: DeliveryAck) {
            self.texts
                .lock()
                .unwrap()
                .push(message.text_or_empty().to_string());
            ack.complete(Ok(None));
        }
    }

    struct Demo {
        controller: Controller,
        bot: Arc<RecordingBot>,
        ended: Arc<Mutex<Vec<ConversationSummary>>>,
    }

    impl Demo {
        fn new(mut controller: Controller) -> Self {
            install(&mut controller);
            let ended = Arc::new(Mutex::new(Vec::new()));
            let seen = Arc::clone(&ended);
            controller.on(events::CONVERSATION_ENDED, move |_, payload| {
                if let Payload::Conversation(summary) = payload {
                    seen.lock().unwrap().push(summary.clone());
                }
                Flow::Continue
            });
            Self {
                controller,
                bot: Arc::new(RecordingBot::default()),
                ended,
            }
        }

        fn say(&mut self, text: &str) {
            let bot: Arc<dyn Bot> = self.bot.clone();
            self.controller
                .receive_message(bot, IncomingMessage::new("U1", "C1", text));
            for _ in 0..5 {
                self.controller.tick();
            }
        }
    }

    #[test]
    fn onboarding_captures_name_and_branches_on_answer() {
        let mut demo = Demo::new(Controller::default());
        demo.say("Hello there");
        demo.say("Ada");
        demo.say("maybe");
        demo.say("yes please");

        assert_eq!(
            demo.bot.texts(),
            vec![
                "Hi, I'm parley.",
                "What should I call you?",
                "Nice to meet you, Ada! Do you write Rust? (yes/no)",
                "Please answer yes or no.",
                "Nice to meet you, Ada! Do you write Rust? (yes/no)",
                "Then we have plenty to talk about, Ada.",
            ]
        );
        let ended = demo.ended.lock().unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].status, Status::Completed);
        assert_eq!(ended[0].responses["name"], "Ada");
        assert_eq!(ended[0].responses["rust"], "yes please");
        assert!(demo.controller.tasks().is_empty());
    }

    #[test]
    fn answering_no_transitions_with_a_message() {
        let mut demo = Demo::new(Controller::default());
        demo.say("hi");
        demo.say("Bob");
        demo.say("nope");

        let texts = demo.bot.texts();
        assert_eq!(
            texts[texts.len() - 2..],
            ["No worries.", "Maybe give it a try some day, Bob."]
        );
    }

    #[test]
    fn unmatched_message_gets_a_hint() {
        let mut demo = Demo::new(Controller::default());
        demo.say("what is this?");
        assert_eq!(demo.bot.texts(), vec![HINT]);
        assert!(demo.controller.tasks().is_empty());
    }

    #[test]
    fn silence_plays_the_timeout_thread() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let controller = Controller::new(ControllerConfig {
            default_time_limit: Some(chrono::Duration::minutes(1)),
            ..ControllerConfig::default()
        })
        .with_clock(clock.clone());
        let mut demo = Demo::new(controller);

        demo.say("hey");
        clock.advance(chrono::Duration::minutes(2));
        for _ in 0..5 {
            demo.controller.tick();
        }

        assert_eq!(
            demo.bot.texts().last().map(String::as_str),
            Some("You went quiet, so I'll stop here. Say hello to start over.")
        );
        let ended = demo.ended.lock().unwrap();
        assert_eq!(ended[0].status, Status::Timeout);
    }
}
