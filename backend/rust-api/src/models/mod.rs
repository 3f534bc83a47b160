pub mod learner;
pub mod mastery;
pub mod progress;
pub mod quest;
pub mod question;
pub mod reward;
