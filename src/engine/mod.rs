// Daimon Engine — Cognitive cycle runtime
// Memory store, context assembly, backend providers and the cycle itself.
// Channel adapters sit outside; they only ever see InboundMessage in and
// reply text out.

pub mod tags;
pub mod template;
pub mod profile;
pub mod store;
pub mod http;
pub mod providers;
pub mod config;
pub mod steps;
pub mod context;
pub mod trace;
pub mod whisper;
pub mod cycle;
pub mod queue;
