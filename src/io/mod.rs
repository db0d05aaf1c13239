pub mod json;
pub mod newick;

pub use json::{RequestDocument, ResponseDocument, SceneSpec, load_request, save_response};
pub use newick::{NewickTopology, parse_newick, read_newick};
