//! codeshare demo: two participants editing one scaffolded buffer.
//!
//! Both sessions run in-process and exchange frames over a `RoomRelay`.
//! Run with `RUST_LOG=info` (or `debug`) to follow the exchange.

mod participant;

use codeshare_collab::{Language, LanguageSwitch, RoomRelay, SessionConfig};
use codeshare_core::BoundaryConfig;
use log::info;
use uuid::Uuid;

use participant::{settle, DemoResult, Participant};

const PREFIX: &str = "def solve(nums):\n    ";
const SUFFIX: &str = "\n\nprint(solve([1, 2, 3]))";

#[tokio::main]
async fn main() -> DemoResult<()> {
    env_logger::init();

    let relay = RoomRelay::new(Uuid::new_v4(), 256);
    let boundary = BoundaryConfig::new(PREFIX, SUFFIX);

    let mut alice =
        Participant::join(&relay, "alice", SessionConfig::default(), boundary.clone(), "return 0").await?;
    alice.session.push_value("total = 0\n    return total");
    alice.flush(&relay)?;

    // Late joiner: holds its default back until the room snapshot arrives.
    let late = SessionConfig {
        in_room: true,
        ..SessionConfig::default()
    };
    let mut bob = Participant::join(&relay, "bob", late, boundary.clone(), "return 0").await?;
    alice.flush(&relay)?;
    settle(&relay, &mut [&mut alice, &mut bob])?;
    info!("bob after joining: {:?}", bob.session.body());

    // Concurrent edits inside the editable region.
    alice.type_at_end("  # alice");
    bob.type_at_end("  # bob");
    alice.flush(&relay)?;
    bob.flush(&relay)?;
    settle(&relay, &mut [&mut alice, &mut bob])?;

    // Scaffold edits are reverted locally and never leave the session.
    bob.delete_head(4);
    settle(&relay, &mut [&mut alice, &mut bob])?;

    // Bob selects the first body line; alice renders it.
    let start = PREFIX.len();
    bob.session.selection_changed(start, start + "total = 0".len());
    bob.flush(&relay)?;
    settle(&relay, &mut [&mut alice, &mut bob])?;
    for decoration in &alice.session.decorations().items {
        info!("alice renders {decoration:?}");
    }

    let converged = alice.session.text() == bob.session.text();
    info!("converged: {converged}");
    info!("alice buffer:\n{}", alice.session.text());
    info!("bob buffer:\n{}", bob.session.text());

    // Switching language keeps the live body when the new scaffold wraps it.
    let switch = LanguageSwitch {
        language: Language::JavaScript,
        boundary: BoundaryConfig::new("function solve(nums) {\n    ", "\n}"),
        initial_body: "return 0;".to_string(),
    };
    if let Some(resolution) = alice.session.switch_language(&switch) {
        info!("alice switched to {} from {:?}", switch.language, resolution.source);
    }

    let stats = relay.stats().await;
    info!(
        "relay: {} frames sent, {} dropped, {} peers",
        stats.frames_sent, stats.frames_dropped, stats.active_peers
    );

    bob.leave(&relay).await?;
    alice.leave(&relay).await?;
    Ok(())
}
