pub mod challenge;
pub mod election;
pub mod outcome;
pub mod session;
pub mod signature;
pub mod voter;
