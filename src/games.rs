use anyhow::Result;

pub mod cherry;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

// A game state for sequential games with n players. This is played in many
// rounds where players take turns in sequence.
pub trait GameState {
    // Tell if a round is over. A round might be over but the game might not be.
    fn is_round_over(&self) -> bool;

    // Tell if the game is over. Also see `is_round_over`.
    fn is_game_over(&self) -> bool;
}

// Source of spin outcomes. Kept object safe so that front ends can hold a
// `Box<dyn Spinner>` and tests can script the draws.
pub trait Spinner {
    fn spin(&mut self) -> Result<i32, cherry::GameError>;
}

impl<S: Spinner + ?Sized> Spinner for &mut S {
    fn spin(&mut self) -> Result<i32, cherry::GameError> {
        (**self).spin()
    }
}

impl<S: Spinner + ?Sized> Spinner for Box<S> {
    fn spin(&mut self) -> Result<i32, cherry::GameError> {
        (**self).spin()
    }
}
