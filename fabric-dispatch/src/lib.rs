//! Task classification, capability/load/health-weighted worker selection, and periodic
//! rebalancing (spec.md §4.7 "Dispatcher (Selector + Balancer)").
pub mod balancer;
pub mod classify;
pub mod dispatcher;
pub mod score;
pub mod strategy;

pub use balancer::Balancer;
pub use balancer::BalancerConfig;
pub use balancer::Migration;
pub use classify::classify_category;
pub use classify::classify_complexity;
pub use classify::required_capabilities;
pub use classify::Category;
pub use classify::ComplexityTier;
pub use dispatcher::DeregisterMigration;
pub use dispatcher::DispatchDecision;
pub use dispatcher::Dispatcher;
pub use dispatcher::NoAvailableTarget;
pub use score::is_eligible;
pub use score::selection_score;
pub use score::Candidate;
pub use score::ScoringContext;
pub use score::SelectionHints;
pub use strategy::select;
pub use strategy::SelectionStrategy;
