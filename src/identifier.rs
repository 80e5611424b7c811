use crate::types::{IdentifierConfig, Result, ThreadcastError};
use url::Url;

/// Extraction strategy turning an item's permalink into a thread key.
pub trait ThreadIdentifier: Send + Sync {
    fn thread_key(&self, permalink: &Url) -> Result<String>;
}

/// Thread key is the first value of a query-string parameter, e.g. `t` in
/// `viewtopic.php?t=47649&goto=newest`.
pub struct QueryParamIdentifier {
    param: String,
}

impl QueryParamIdentifier {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl ThreadIdentifier for QueryParamIdentifier {
    fn thread_key(&self, permalink: &Url) -> Result<String> {
        permalink
            .query_pairs()
            .find(|(key, _)| key == self.param.as_str())
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| ThreadcastError::MissingParameter {
                param: self.param.clone(),
                permalink: permalink.to_string(),
            })
    }
}

impl IdentifierConfig {
    pub fn build(&self) -> Box<dyn ThreadIdentifier> {
        match self {
            IdentifierConfig::Parameter { param_name } => {
                Box::new(QueryParamIdentifier::new(param_name.clone()))
            }
        }
    }
}
