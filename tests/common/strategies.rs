//! Proptest strategies generating random registries over a small universe of
//! stage types, plus a reference model of first-match-wins resolution.

use async_trait::async_trait;
use pipeline_dispatch::{
    FinalHandler, HandlerDescriptor, HandlerRegistry, HandlerResult, Next, PipeHandler,
    RegistryBuilder,
};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

pub const STAGES: usize = 4;

/// Request type of stage `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage<const N: usize>;

/// Response type every stage chain produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trail(pub Vec<String>);

/// Pipe `Stage<FROM> -> Stage<TO>`.
pub struct Hop<const FROM: usize, const TO: usize>;

#[async_trait]
impl<const FROM: usize, const TO: usize> PipeHandler for Hop<FROM, TO> {
    type Request = Stage<FROM>;
    type Response = Trail;
    type NextRequest = Stage<TO>;
    type NextResponse = Trail;

    async fn handle(
        &self,
        _: Stage<FROM>,
        cancellation: CancellationToken,
        next: Next<Stage<TO>, Trail>,
    ) -> HandlerResult<Trail> {
        let Trail(mut steps) = next.run(Stage::<TO>, cancellation).await?;
        steps.insert(0, format!("hop{}->{}", FROM, TO));
        Ok(Trail(steps))
    }
}

/// Terminal at `Stage<AT>`.
pub struct Land<const AT: usize>;

#[async_trait]
impl<const AT: usize> FinalHandler for Land<AT> {
    type Request = Stage<AT>;
    type Response = Trail;

    async fn handle(&self, _: Stage<AT>, _: CancellationToken) -> HandlerResult<Trail> {
        Ok(Trail(vec![format!("land{}", AT)]))
    }
}

/// One generated registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStep {
    Hop { from: usize, to: usize },
    Land { at: usize },
}

impl StageStep {
    fn accepts(&self, stage: usize) -> bool {
        match *self {
            StageStep::Hop { from, .. } => from == stage,
            StageStep::Land { at } => at == stage,
        }
    }
}

/// Name of the descriptor registered for `steps[position]`.
pub fn step_name(position: usize, step: &StageStep) -> String {
    match step {
        StageStep::Hop { from, to } => format!("{position}:hop{from}->{to}"),
        StageStep::Land { at } => format!("{position}:land{at}"),
    }
}

macro_rules! hop_descriptor {
    ($name:expr, $from:expr, $to:expr; $($f:literal => [$($t:literal),*]),*) => {
        match ($from, $to) {
            $($(($f, $t) => HandlerDescriptor::for_pipe($name, || Hop::<$f, $t>),)*)*
            _ => unreachable!("stage out of range"),
        }
    };
}

fn descriptor(position: usize, step: &StageStep) -> HandlerDescriptor {
    let name = step_name(position, step);
    match *step {
        StageStep::Hop { from, to } => hop_descriptor!(&name, from, to;
            0 => [0, 1, 2, 3],
            1 => [0, 1, 2, 3],
            2 => [0, 1, 2, 3],
            3 => [0, 1, 2, 3]),
        StageStep::Land { at } => match at {
            0 => HandlerDescriptor::for_final(&name, || Land::<0>),
            1 => HandlerDescriptor::for_final(&name, || Land::<1>),
            2 => HandlerDescriptor::for_final(&name, || Land::<2>),
            3 => HandlerDescriptor::for_final(&name, || Land::<3>),
            _ => unreachable!("stage out of range"),
        },
    }
}

pub fn stage_registry(steps: &[StageStep]) -> HandlerRegistry {
    steps
        .iter()
        .enumerate()
        .fold(RegistryBuilder::new(), |builder, (position, step)| {
            builder.register(descriptor(position, step))
        })
        .build()
        .expect("stage registry")
}

/// Expected descriptor names for a chain starting at `start`, or `None`
/// when resolution gets stuck.
pub fn expected_chain(steps: &[StageStep], start: usize) -> Option<Vec<String>> {
    let mut remaining: Vec<(usize, StageStep)> = steps.iter().copied().enumerate().collect();
    let mut current = start;
    let mut names = Vec::new();

    loop {
        let index = remaining.iter().position(|(_, step)| step.accepts(current))?;
        let (position, step) = remaining.remove(index);
        names.push(step_name(position, &step));
        match step {
            StageStep::Hop { to, .. } => current = to,
            StageStep::Land { .. } => return Some(names),
        }
    }
}

pub fn stage_step_strategy() -> impl Strategy<Value = StageStep> {
    prop_oneof![
        3 => (0..STAGES, 0..STAGES).prop_map(|(from, to)| StageStep::Hop { from, to }),
        2 => (0..STAGES).prop_map(|at| StageStep::Land { at }),
    ]
}

pub fn stage_steps_strategy() -> impl Strategy<Value = Vec<StageStep>> {
    prop::collection::vec(stage_step_strategy(), 1..10)
}
