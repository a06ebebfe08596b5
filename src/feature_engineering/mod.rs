//! Text feature extraction
//!
//! - [`TextTokenizer`] / [`TfidfVectorizer`] - tokenization and term weighting
//! - [`CsrMatrix`] - sparse storage for the weighted rows
//! - [`FeatureTransformer`] - the document-table stage of the preparation pipeline

mod sparse;
mod text_features;
mod transformer;

pub use sparse::CsrMatrix;
pub use text_features::{TextTokenizer, TfidfVectorizer};
pub use transformer::FeatureTransformer;
