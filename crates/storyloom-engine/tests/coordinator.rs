//! Behavioral tests for the session actor: the round lifecycle, the
//! resolve/acknowledge advance handshake, retries, and roll timeouts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use storyloom_core::rng::DeterministicRng;
use storyloom_rules::{Ability, AbilityScores, RollOutcome, StatusEffect};
use storyloom_test_support::{
    BrokenStreamNarrator, FailingJudge, FailingNarrator, FailingStoryStore, FixedClock,
    MockRng, RecordingStoryStore, ScriptedJudge, ScriptedNarrator, SequenceRng,
};

use storyloom_engine::collaborators::{Judge, JudgeVerdict, Narrator, StoryStore};
use storyloom_engine::config::EngineConfig;
use storyloom_engine::coordinator::{SessionCommand, SessionCoordinator, SessionDeps, SessionHandle};
use storyloom_engine::domain::judgment::{CharacterProfile, WorldContext};
use storyloom_engine::domain::round::SessionPhase;
use storyloom_engine::events::ServerEvent;
use storyloom_engine::snapshot::SessionSnapshot;

struct TestPlayer {
    user_id: Uuid,
    character_id: Uuid,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

fn spawn_with(
    judge: Arc<dyn Judge>,
    narrator: Arc<dyn Narrator>,
    store: Arc<dyn StoryStore>,
    rng: Box<dyn DeterministicRng>,
    roll_timeout: Option<Duration>,
) -> (SessionHandle, Uuid) {
    let session_id = Uuid::new_v4();
    let fixed_now = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
    let config = EngineConfig {
        roll_timeout,
        ..EngineConfig::default()
    };
    let handle = SessionCoordinator::spawn(
        session_id,
        WorldContext::new("a rain-slick port city"),
        config,
        SessionDeps {
            judge,
            narrator,
            store,
            clock: Arc::new(FixedClock(fixed_now)),
            rng,
        },
    );
    (handle, session_id)
}

fn default_setup() -> (
    Arc<ScriptedJudge>,
    Arc<ScriptedNarrator>,
    Arc<RecordingStoryStore>,
) {
    (
        Arc::new(ScriptedJudge::constant(ScriptedJudge::verdict(10))),
        Arc::new(ScriptedNarrator::new(vec!["The ", "door ", "gives."])),
        Arc::new(RecordingStoryStore::new()),
    )
}

async fn next_event(player: &mut TestPlayer) -> ServerEvent {
    timeout(Duration::from_secs(2), player.rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn await_snapshot(
    handle: &SessionHandle,
    pred: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = handle.snapshot.clone();
    timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot channel closed")
        .clone()
}

async fn wait_for(
    player: &mut TestPlayer,
    pred: impl Fn(&ServerEvent) -> bool,
) -> ServerEvent {
    loop {
        let event = next_event(player).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn join(handle: &SessionHandle, name: &str, scores: AbilityScores) -> TestPlayer {
    join_with_effects(handle, name, scores, Vec::new()).await
}

async fn join_with_effects(
    handle: &SessionHandle,
    name: &str,
    scores: AbilityScores,
    status_effects: Vec<StatusEffect>,
) -> TestPlayer {
    let (sender, rx) = mpsc::unbounded_channel();
    let user_id = Uuid::new_v4();
    let character_id = Uuid::new_v4();
    handle
        .commands
        .send(SessionCommand::Join {
            user_id,
            profile: CharacterProfile {
                id: character_id,
                name: name.to_owned(),
                abilities: scores,
                status_effects,
            },
            sender,
        })
        .await
        .unwrap();
    let mut player = TestPlayer {
        user_id,
        character_id,
        rx,
    };
    let joined = player.user_id;
    wait_for(&mut player, |e| {
        matches!(e, ServerEvent::UserJoined { user_id, .. } if *user_id == joined)
    })
    .await;
    player
}

async fn submit(handle: &SessionHandle, player: &TestPlayer, text: &str) {
    handle
        .commands
        .send(SessionCommand::SubmitAction {
            user_id: player.user_id,
            character_id: player.character_id,
            action_text: text.to_owned(),
            action_type: Ability::Dexterity,
        })
        .await
        .unwrap();
}

async fn start_round(handle: &SessionHandle, host: &TestPlayer) {
    handle
        .commands
        .send(SessionCommand::StartRound {
            user_id: host.user_id,
        })
        .await
        .unwrap();
}

async fn roll(handle: &SessionHandle, player: &TestPlayer, judgment_id: Uuid, value: i32) {
    handle
        .commands
        .send(SessionCommand::RollDice {
            user_id: player.user_id,
            character_id: player.character_id,
            judgment_id,
            dice_result: value,
        })
        .await
        .unwrap();
}

async fn acknowledge(handle: &SessionHandle, player: &TestPlayer, index: usize) {
    handle
        .commands
        .send(SessionCommand::AcknowledgeRoll {
            user_id: player.user_id,
            current_index: index,
        })
        .await
        .unwrap();
}

async fn await_judgment(player: &mut TestPlayer) -> Uuid {
    let event = wait_for(player, |e| {
        matches!(e, ServerEvent::JudgmentReady { .. })
    })
    .await;
    match event {
        ServerEvent::JudgmentReady { judgment_id, .. } => judgment_id,
        _ => unreachable!(),
    }
}

fn strength(score: i32) -> AbilityScores {
    AbilityScores {
        strength: score,
        ..AbilityScores::default()
    }
}

#[tokio::test]
async fn test_full_round_resolves_actions_in_submission_order() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(
        Arc::clone(&judge) as Arc<dyn Judge>,
        Arc::clone(&narrator) as Arc<dyn Narrator>,
        Arc::clone(&store) as Arc<dyn StoryStore>,
        Box::new(MockRng),
        None,
    );
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    let mut second = join(&handle, "Brenn", AbilityScores::default()).await;

    submit(&handle, &host, "pick the lock").await;
    submit(&handle, &second, "watch the corridor").await;
    start_round(&handle, &host).await;

    // First slot belongs to the host, who submitted first.
    let first_judgment = await_judgment(&mut host).await;
    roll(&handle, &host, first_judgment, 10).await;
    wait_for(&mut host, |e| matches!(e, ServerEvent::DiceRolled { .. })).await;
    acknowledge(&handle, &host, 0).await;

    let advance = wait_for(&mut second, |e| {
        matches!(e, ServerEvent::NextJudgment { .. })
    })
    .await;
    match advance {
        ServerEvent::NextJudgment { judgment_index, .. } => assert_eq!(judgment_index, 1),
        _ => unreachable!(),
    }

    let second_judgment = await_judgment(&mut second).await;
    roll(&handle, &second, second_judgment, 14).await;
    acknowledge(&handle, &second, 1).await;

    wait_for(&mut host, |e| matches!(e, ServerEvent::AllDiceRolled { .. })).await;
    wait_for(&mut host, |e| {
        matches!(e, ServerEvent::StoryGenerationStarted { .. })
    })
    .await;
    let complete = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::StoryGenerationComplete { .. })
    })
    .await;

    match complete {
        ServerEvent::StoryGenerationComplete {
            narrative,
            judgments,
            ..
        } => {
            assert_eq!(narrative, "The door gives.");
            assert_eq!(judgments.len(), 2);
            assert_eq!(judgments[0].action_text, "pick the lock");
            assert_eq!(judgments[1].action_text, "watch the corridor");
        }
        _ => unreachable!(),
    }

    // Judgments were requested strictly in queue order.
    assert_eq!(judge.judged_actions(), vec![1, 2]);
    assert_eq!(store.commits().len(), 1);
    assert_eq!(store.commits()[0].narrative, "The door gives.");
    // The round's player actions were logged before judging began.
    let appended = store.appended_entries();
    assert_eq!(appended.len(), 1);
    assert!(appended[0].1.content.contains("Ayla: pick the lock"));
}

#[tokio::test]
async fn test_roll_applies_ability_modifier_against_difficulty() {
    let judge = Arc::new(ScriptedJudge::constant(JudgeVerdict {
        ability: Ability::Strength,
        difficulty: 15,
        reasoning: "heavy door".to_owned(),
    }));
    let (_, narrator, store) = default_setup();
    let (handle, _) = spawn_with(
        Arc::clone(&judge) as Arc<dyn Judge>,
        narrator,
        store,
        Box::new(MockRng),
        None,
    );
    // Strength 16 gives +3.
    let mut host = join(&handle, "Ayla", strength(16)).await;

    submit(&handle, &host, "force the door").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;
    roll(&handle, &host, judgment_id, 12).await;

    let rolled = wait_for(&mut host, |e| matches!(e, ServerEvent::DiceRolled { .. })).await;
    match rolled {
        ServerEvent::DiceRolled {
            dice_result,
            modifier,
            final_value,
            outcome,
            ..
        } => {
            assert_eq!(dice_result, 12);
            assert_eq!(modifier, 3);
            assert_eq!(final_value, 15);
            assert_eq!(outcome, RollOutcome::Success);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_natural_one_is_critical_failure_despite_high_modifier() {
    let judge = Arc::new(ScriptedJudge::constant(JudgeVerdict {
        ability: Ability::Strength,
        difficulty: 5,
        reasoning: "trivial".to_owned(),
    }));
    let (_, narrator, store) = default_setup();
    let (handle, _) = spawn_with(
        Arc::clone(&judge) as Arc<dyn Judge>,
        narrator,
        store,
        Box::new(MockRng),
        None,
    );
    // Strength 20 gives +5; 1 + 5 = 6 would clear DC 5.
    let mut host = join(&handle, "Ayla", strength(20)).await;

    submit(&handle, &host, "kick the pebble").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;
    roll(&handle, &host, judgment_id, 1).await;

    let rolled = wait_for(&mut host, |e| matches!(e, ServerEvent::DiceRolled { .. })).await;
    match rolled {
        ServerEvent::DiceRolled { outcome, .. } => {
            assert_eq!(outcome, RollOutcome::CriticalFailure);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_status_effects_shift_the_modifier() {
    let judge = Arc::new(ScriptedJudge::constant(JudgeVerdict {
        ability: Ability::Strength,
        difficulty: 10,
        reasoning: "strained".to_owned(),
    }));
    let (_, narrator, store) = default_setup();
    let (handle, _) = spawn_with(
        Arc::clone(&judge) as Arc<dyn Judge>,
        narrator,
        store,
        Box::new(MockRng),
        None,
    );
    let mut host = join_with_effects(
        &handle,
        "Ayla",
        strength(16),
        vec![StatusEffect {
            name: "exhausted".to_owned(),
            modifier: -2,
        }],
    )
    .await;

    submit(&handle, &host, "lift the gate").await;
    start_round(&handle, &host).await;

    let event = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::JudgmentReady { .. })
    })
    .await;
    match event {
        ServerEvent::JudgmentReady { modifier, .. } => assert_eq!(modifier, 1),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_second_action_for_same_character_is_rejected() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;

    submit(&handle, &host, "pick the lock").await;
    submit(&handle, &host, "also kick the door").await;

    let rejection = wait_for(&mut host, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("already has an action"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_roll_outside_awaiting_roll_phase_is_rejected() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;

    submit(&handle, &host, "pick the lock").await;
    roll(&handle, &host, Uuid::new_v4(), 10).await;

    let rejection = wait_for(&mut host, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("collecting"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_roll_out_of_range_is_rejected() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;

    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;
    roll(&handle, &host, judgment_id, 21).await;

    let rejection = wait_for(&mut host, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("outside the 1..=20 range"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_duplicate_roll_is_rejected() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    let second = join(&handle, "Brenn", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    submit(&handle, &second, "watch the corridor").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;

    roll(&handle, &host, judgment_id, 10).await;
    roll(&handle, &host, judgment_id, 15).await;

    let rejection = wait_for(&mut host, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("already has a resolved roll"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_roll_against_another_characters_judgment_is_rejected() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    let mut second = join(&handle, "Brenn", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    submit(&handle, &second, "watch the corridor").await;
    start_round(&handle, &host).await;

    // Observers learn the judgment id from the analyzed broadcast.
    let analyzed = wait_for(&mut second, |e| {
        matches!(e, ServerEvent::PlayerActionAnalyzed { .. })
    })
    .await;
    let judgment_id = match analyzed {
        ServerEvent::PlayerActionAnalyzed {
            judgment_id,
            action_text,
            ..
        } => {
            assert_eq!(action_text, "pick the lock");
            judgment_id
        }
        _ => unreachable!(),
    };

    // Brenn answers Ayla's judgment with their own character.
    roll(&handle, &second, judgment_id, 15).await;
    let rejection = wait_for(&mut second, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("was not issued for character"));
        }
        _ => unreachable!(),
    }

    // The owner's own roll still resolves.
    roll(&handle, &host, judgment_id, 10).await;
    wait_for(&mut host, |e| matches!(e, ServerEvent::DiceRolled { .. })).await;
}

#[tokio::test]
async fn test_early_acknowledgment_is_buffered_and_consumed_once() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    let mut second = join(&handle, "Brenn", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    submit(&handle, &second, "watch the corridor").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;

    // Ack lands before the roll; the advance must wait for both.
    acknowledge(&handle, &host, 0).await;
    roll(&handle, &host, judgment_id, 10).await;

    let advance = wait_for(&mut second, |e| {
        matches!(e, ServerEvent::NextJudgment { .. })
    })
    .await;
    match advance {
        ServerEvent::NextJudgment { judgment_index, .. } => assert_eq!(judgment_index, 1),
        _ => unreachable!(),
    }

    // A late duplicate ack for the consumed index is rejected and
    // does not advance the round again.
    acknowledge(&handle, &host, 0).await;
    let rejection = wait_for(&mut host, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("does not match the current action"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_mid_round_submission_joins_next_round() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    let mut second = join(&handle, "Brenn", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;

    // The second player submits while the round is in flight.
    submit(&handle, &second, "loot the shelf").await;
    wait_for(&mut second, |e| {
        matches!(e, ServerEvent::ActionSubmitted { .. })
    })
    .await;

    roll(&handle, &host, judgment_id, 10).await;
    acknowledge(&handle, &host, 0).await;
    wait_for(&mut host, |e| {
        matches!(e, ServerEvent::StoryGenerationComplete { .. })
    })
    .await;

    // The held-back action opens the next collecting phase.
    let queued = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::QueueUpdated { queue_count: 1, .. })
    })
    .await;
    match queued {
        ServerEvent::QueueUpdated { queue_count, .. } => assert_eq!(queue_count, 1),
        _ => unreachable!(),
    }
    let snapshot = await_snapshot(&handle, |s| s.phase == SessionPhase::Collecting).await;
    assert_eq!(snapshot.queue_count, 1);
}

#[tokio::test]
async fn test_judge_failure_stalls_round_until_retried() {
    let judge = Arc::new(FailingJudge::until_recovered(1, ScriptedJudge::verdict(10)));
    let (_, narrator, store) = default_setup();
    let (handle, _) = spawn_with(
        Arc::clone(&judge) as Arc<dyn Judge>,
        narrator,
        store,
        Box::new(MockRng),
        None,
    );
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;

    let failure = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::AiGenerationError { .. })
    })
    .await;
    match failure {
        ServerEvent::AiGenerationError { phase, .. } => assert_eq!(phase, "judgment"),
        _ => unreachable!(),
    }

    handle
        .commands
        .send(SessionCommand::RetryJudgment {
            user_id: host.user_id,
        })
        .await
        .unwrap();
    await_judgment(&mut host).await;
}

#[tokio::test]
async fn test_narrator_failure_stalls_round_until_retried() {
    let (judge, _, store) = default_setup();
    let narrator = Arc::new(FailingNarrator::until_recovered(1, vec!["All ", "is well."]));
    let (handle, _) = spawn_with(
        judge,
        Arc::clone(&narrator) as Arc<dyn Narrator>,
        Arc::clone(&store) as Arc<dyn StoryStore>,
        Box::new(MockRng),
        None,
    );
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;
    roll(&handle, &host, judgment_id, 10).await;
    acknowledge(&handle, &host, 0).await;

    let failure = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::AiGenerationError { .. })
    })
    .await;
    match failure {
        ServerEvent::AiGenerationError { phase, .. } => assert_eq!(phase, "narrative"),
        _ => unreachable!(),
    }
    assert!(store.commits().is_empty());

    handle
        .commands
        .send(SessionCommand::RetryNarration {
            user_id: host.user_id,
        })
        .await
        .unwrap();
    let complete = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::StoryGenerationComplete { .. })
    })
    .await;
    match complete {
        ServerEvent::StoryGenerationComplete { narrative, .. } => {
            assert_eq!(narrative, "All is well.");
        }
        _ => unreachable!(),
    }
    assert_eq!(store.commits().len(), 1);
}

#[tokio::test]
async fn test_broken_narration_stream_surfaces_narrative_error() {
    let (judge, _, store) = default_setup();
    let narrator = Arc::new(BrokenStreamNarrator::new(vec!["The door "]));
    let (handle, _) = spawn_with(
        judge,
        narrator,
        Arc::clone(&store) as Arc<dyn StoryStore>,
        Box::new(MockRng),
        None,
    );
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;
    roll(&handle, &host, judgment_id, 10).await;
    acknowledge(&handle, &host, 0).await;

    wait_for(&mut host, |e| {
        matches!(e, ServerEvent::NarrativeToken { .. })
    })
    .await;
    let failure = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::AiGenerationError { .. })
    })
    .await;
    match failure {
        ServerEvent::AiGenerationError { phase, .. } => assert_eq!(phase, "narrative"),
        _ => unreachable!(),
    }
    // Nothing was committed for the interrupted stream.
    assert!(store.commits().is_empty());
}

#[tokio::test]
async fn test_commit_failure_keeps_round_open_for_retry() {
    let (judge, narrator, _) = default_setup();
    let store = Arc::new(FailingStoryStore::failing_commits());
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;
    roll(&handle, &host, judgment_id, 10).await;
    acknowledge(&handle, &host, 0).await;

    let failure = wait_for(&mut host, |e| {
        matches!(e, ServerEvent::AiGenerationError { .. })
    })
    .await;
    match failure {
        ServerEvent::AiGenerationError { phase, .. } => assert_eq!(phase, "narrative"),
        _ => unreachable!(),
    }
    let snapshot = await_snapshot(&handle, |s| s.phase == SessionPhase::Narrating).await;
    assert!(snapshot.round.is_some());
}

#[tokio::test]
async fn test_non_host_cannot_start_round_or_end_session() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let host = join(&handle, "Ayla", AbilityScores::default()).await;
    let mut second = join(&handle, "Brenn", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;

    handle
        .commands
        .send(SessionCommand::StartRound {
            user_id: second.user_id,
        })
        .await
        .unwrap();
    let rejection = wait_for(&mut second, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("not the session host"));
        }
        _ => unreachable!(),
    }

    handle
        .commands
        .send(SessionCommand::End {
            user_id: Some(second.user_id),
        })
        .await
        .unwrap();
    let rejection = wait_for(&mut second, |e| matches!(e, ServerEvent::Error { .. })).await;
    match rejection {
        ServerEvent::Error { message, .. } => {
            assert!(message.contains("not the session host"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_session_end_discards_round_state_and_closes_actor() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(
        judge,
        narrator,
        Arc::clone(&store) as Arc<dyn StoryStore>,
        Box::new(MockRng),
        None,
    );
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    let mut second = join(&handle, "Brenn", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    await_judgment(&mut host).await;

    handle
        .commands
        .send(SessionCommand::End {
            user_id: Some(host.user_id),
        })
        .await
        .unwrap();

    wait_for(&mut second, |e| matches!(e, ServerEvent::SessionEnded { .. })).await;
    // The actor shuts down and its mailbox closes.
    timeout(Duration::from_secs(2), async {
        while !handle.commands.is_closed() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("actor did not shut down");
    // Nothing from the discarded round reached the story log.
    assert!(store.commits().is_empty());
}

#[tokio::test]
async fn test_host_leaving_ends_the_session() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let host = join(&handle, "Ayla", AbilityScores::default()).await;
    let mut second = join(&handle, "Brenn", AbilityScores::default()).await;

    handle
        .commands
        .send(SessionCommand::Leave {
            user_id: host.user_id,
        })
        .await
        .unwrap();

    wait_for(&mut second, |e| matches!(e, ServerEvent::UserLeft { .. })).await;
    wait_for(&mut second, |e| matches!(e, ServerEvent::SessionEnded { .. })).await;
}

#[tokio::test]
async fn test_joining_mid_session_receives_a_snapshot_first() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let host = join(&handle, "Ayla", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;

    let (sender, mut rx) = mpsc::unbounded_channel();
    handle
        .commands
        .send(SessionCommand::Join {
            user_id: Uuid::new_v4(),
            profile: CharacterProfile {
                id: Uuid::new_v4(),
                name: "Brenn".to_owned(),
                abilities: AbilityScores::default(),
                status_effects: Vec::new(),
            },
            sender,
        })
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    match first {
        ServerEvent::SessionSnapshot { snapshot } => {
            assert_eq!(snapshot.phase, SessionPhase::Collecting);
            assert_eq!(snapshot.queue_count, 1);
            assert_eq!(snapshot.participants.len(), 1);
        }
        other => panic!("expected SessionSnapshot first, got {other:?}"),
    }
}

#[tokio::test]
async fn test_roll_timeout_resolves_on_behalf_of_absent_player() {
    let (_, narrator, store) = default_setup();
    let judge = Arc::new(ScriptedJudge::constant(ScriptedJudge::verdict(10)));
    let (handle, _) = spawn_with(
        judge,
        narrator,
        Arc::clone(&store) as Arc<dyn StoryStore>,
        Box::new(SequenceRng::new(vec![20])),
        Some(Duration::from_millis(50)),
    );
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    await_judgment(&mut host).await;

    // Never roll; the engine rolls and acknowledges for us.
    let rolled = wait_for(&mut host, |e| matches!(e, ServerEvent::DiceRolled { .. })).await;
    match rolled {
        ServerEvent::DiceRolled {
            dice_result,
            outcome,
            ..
        } => {
            assert_eq!(dice_result, 20);
            assert_eq!(outcome, RollOutcome::CriticalSuccess);
        }
        _ => unreachable!(),
    }
    wait_for(&mut host, |e| matches!(e, ServerEvent::AllDiceRolled { .. })).await;
    wait_for(&mut host, |e| {
        matches!(e, ServerEvent::StoryGenerationComplete { .. })
    })
    .await;
    assert_eq!(store.commits().len(), 1);
}

#[tokio::test]
async fn test_roll_timeout_acknowledges_a_resolved_but_unacked_roll() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(
        judge,
        narrator,
        Arc::clone(&store) as Arc<dyn StoryStore>,
        Box::new(MockRng),
        Some(Duration::from_millis(50)),
    );
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;
    submit(&handle, &host, "pick the lock").await;
    start_round(&handle, &host).await;
    let judgment_id = await_judgment(&mut host).await;

    // Roll, then never acknowledge; the fresh window expires and the
    // engine acknowledges on the roller's behalf.
    roll(&handle, &host, judgment_id, 10).await;
    wait_for(&mut host, |e| matches!(e, ServerEvent::DiceRolled { .. })).await;

    wait_for(&mut host, |e| matches!(e, ServerEvent::AllDiceRolled { .. })).await;
    wait_for(&mut host, |e| {
        matches!(e, ServerEvent::StoryGenerationComplete { .. })
    })
    .await;
    assert_eq!(store.commits().len(), 1);
}

#[tokio::test]
async fn test_snapshot_tracks_phase_through_the_round() {
    let (judge, narrator, store) = default_setup();
    let (handle, _) = spawn_with(judge, narrator, store, Box::new(MockRng), None);
    let mut host = join(&handle, "Ayla", AbilityScores::default()).await;

    submit(&handle, &host, "pick the lock").await;
    wait_for(&mut host, |e| matches!(e, ServerEvent::QueueUpdated { .. })).await;
    await_snapshot(&handle, |s| s.phase == SessionPhase::Collecting).await;

    start_round(&handle, &host).await;
    await_judgment(&mut host).await;
    let snapshot = await_snapshot(&handle, |s| s.phase == SessionPhase::AwaitingRoll).await;
    let round = snapshot.round.expect("round in flight");
    assert_eq!(round.total_actions, 1);
    assert!(round.slots[0].judged);
    assert!(!round.slots[0].rolled);
}
