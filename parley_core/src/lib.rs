#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Scripted, multi-turn dialog runtime.
//!
//! A [`Controller`] owns every running [`Task`]; each task owns the
//! [`Conversation`]s spawned from one inbound trigger. Conversations advance
//! one queued message per scheduler tick and block while waiting for an
//! answer. Connectors plug in through the [`Bot`] trait.
//!
//! # Key Features
//! - Named threads with explicit copy-on-enter semantics
//! - Answer capture with keyed and multi-user responses
//! - Ordered middleware chains with explicit continuation
//! - Pluggable pattern matcher (regex by default)
//! - Timeouts checked against both task age and idle time

pub mod bot;
pub mod clock;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod matcher;
pub mod message;
pub mod middleware;
pub mod storage;
pub mod task;

pub use bot::{Bot, ConversationRef, DeliveryAck, Identity};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    Command, Controller, ControllerConfig, ControllerHandle, EventHandler, Flow, HearsCallback,
    HearsTest, Payload, Runtime, events,
};
pub use conversation::{
    Callback, Captured, Conversation, ConversationSummary, DEFAULT_THREAD, Handler,
    PatternBranch, ResponseView, Status, TIMEOUT_THREAD, TranscriptEntry,
};
pub use error::{Error, MiddlewareError, Result, StorageError};
pub use matcher::{MatchResult, Matcher, RegexMatcher};
pub use message::{
    Action, CaptureOptions, IncomingMessage, MessageText, OutgoingMessage, ScriptMessage,
};
pub use middleware::{Chain, ErrorChain, Next, Pipeline, StepContext};
pub use storage::{MemoryStore, Storage, Store};
pub use task::{Task, TaskStatus, TaskSummary};
