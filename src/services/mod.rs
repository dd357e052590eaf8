pub mod delivery;
pub mod detection;
pub mod dispatcher;
pub mod intake;
pub mod layouts;
pub mod link;
pub mod processing;
pub mod queue;
pub mod registry;
pub mod result_sender;
pub mod submission;

#[cfg(test)]
pub(crate) mod testing;
