//! Cross-crate integration tests for paraeq

#[cfg(test)]
mod equalizer_integration;
