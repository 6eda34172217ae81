//! Property-based tests for navigation
//!
//! These tests verify stack invariants hold across arbitrary command sequences.

use super::*;
use crate::event::Chat;
use crate::runtime::testing::TestRuntime;
use crate::widgets::{Action, Button, Counter, KeyboardNode, TextNode};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

const STATES: [&str; 3] = ["a", "b", "c"];

fn main_state(name: &str) -> State {
    State::new("Main", name)
}

fn wizard() -> Dialog {
    let mut dialog = Dialog::new("Main");
    for name in STATES {
        dialog = dialog.window(
            Window::new(main_state(name))
                .text(TextNode::format(format!("{name}: {{start_data.n}}")))
                .keyboard(KeyboardNode::row([
                    Button::new("back", "Back", Action::Back).into(),
                    Button::new("next", "Next", Action::Next).into(),
                    Counter::new("hits").into(),
                ])),
        );
    }
    dialog
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Start(usize),
    Next,
    Back,
    Done,
    Reset,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..STATES.len()).prop_map(Op::Start),
        Just(Op::Next),
        Just(Op::Back),
        Just(Op::Done),
        Just(Op::Reset),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Depth tracks starts minus closes; next/back never change it
    #[test]
    fn prop_depth_matches_open_frames(ops in proptest::collection::vec(arb_op(), 0..25)) {
        block_on(async {
            let (runtime, _transport) = TestRuntime::new().with_dialog(wizard()).build();
            let event = InboundEvent::callback(Chat::private(1), 1, "x");
            let mut manager = runtime.manager(event).await.unwrap();
            let mut expected: usize = 0;

            for op in ops {
                let before = manager.stack().len();
                let result = match op {
                    Op::Start(i) => manager.start(main_state(STATES[i]), json!({"n": i}), StartMode::Normal).await,
                    Op::Next => manager.next().await,
                    Op::Back => manager.back().await,
                    Op::Done => manager.done(Value::Null).await,
                    Op::Reset => manager.reset_stack().await,
                };
                match (&op, &result) {
                    (Op::Start(_), Ok(())) => expected += 1,
                    (Op::Done, Ok(())) => expected -= 1,
                    (Op::Reset, Ok(())) => expected = 0,
                    (_, Err(_)) => assert_eq!(manager.stack().len(), before),
                    _ => {}
                }
                assert_eq!(manager.stack().len(), expected);
                assert_eq!(manager.has_context(), expected > 0);
            }
            manager.close().await.unwrap();
        });
    }

    /// `back` on the first state fails and leaves the frame in place
    #[test]
    fn prop_back_never_underflows(backs in 1usize..6) {
        block_on(async {
            let (runtime, _transport) = TestRuntime::new().with_dialog(wizard()).build();
            let mut manager = runtime
                .manager(InboundEvent::callback(Chat::private(1), 1, "x"))
                .await
                .unwrap();
            manager.start(main_state("a"), json!({"n": 0}), StartMode::Normal).await.unwrap();
            for _ in 0..backs {
                assert!(manager.back().await.is_err());
                assert_eq!(manager.stack().len(), 1);
                assert_eq!(manager.current_state(), Some(&main_state("a")));
            }
            manager.close().await.unwrap();
        });
    }

    /// Reset always leaves an empty stack with no current context
    #[test]
    fn prop_reset_empties_any_stack(depth in 0usize..8) {
        block_on(async {
            let (runtime, _transport) = TestRuntime::new().with_dialog(wizard()).build();
            let mut manager = runtime
                .manager(InboundEvent::text(Chat::private(1), 1, "/start"))
                .await
                .unwrap();
            for i in 0..depth {
                manager
                    .start(main_state(STATES[i % STATES.len()]), json!({"n": i}), StartMode::Normal)
                    .await
                    .unwrap();
            }
            manager.reset_stack().await.unwrap();
            assert!(manager.stack().is_empty());
            assert!(matches!(manager.next().await, Err(DialogError::NoContext)));
            manager.close().await.unwrap();
        });
    }

    /// Rendering twice without changes yields the same messages
    #[test]
    fn prop_render_is_idempotent(state in 0..STATES.len(), n in any::<i32>(), hits in 0i64..50) {
        block_on(async {
            let (runtime, _transport) = TestRuntime::new().with_dialog(wizard()).build();
            let mut manager = runtime
                .manager(InboundEvent::callback(Chat::private(1), 1, "x"))
                .await
                .unwrap();
            manager
                .start(main_state(STATES[state]), json!({"n": n}), StartMode::Normal)
                .await
                .unwrap();
            if let Some(context) = manager.current.as_mut() {
                context.widget_data.insert("hits".into(), json!(hits));
            }
            let first = manager.render().unwrap();
            let second = manager.render().unwrap();
            assert_eq!(first, second);
            assert_eq!(first[0].text, format!("{}: {n}", STATES[state]));
            manager.close().await.unwrap();
        });
    }
}
