//! The conversation graphs and the steps they are made of.

mod common;
mod filling;
mod intake;
mod issue;
mod laws;
mod template_analysis;

pub use filling::build_filling_graph;
pub use intake::{INTAKE_GRAPH, build_intake_graph};
pub use issue::{ISSUE_GRAPH, build_issue_graph};
pub use laws::{LAWS_ANALYSIS_GRAPH, build_laws_analysis_graph};
pub use template_analysis::{TEMPLATE_ANALYSIS_GRAPH, build_template_analysis_graph};
