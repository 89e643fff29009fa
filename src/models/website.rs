use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Website {
    pub id: i64,
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewWebsite {
    pub url: String,
    pub name: String,
}
