//! Classifier and decision components

pub mod classifier;
pub mod logistic;
pub mod policy;

pub use classifier::{Classifier, ClassifierModel};
pub use logistic::LogisticRegression;
pub use policy::DecisionPolicy;
