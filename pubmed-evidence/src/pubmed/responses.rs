use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct ESearchResult {
    pub esearchresult: ESearchData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ESearchData {
    #[serde(default, rename = "ERROR")]
    pub error: Option<String>,
    #[serde(default)]
    pub count: Option<String>,
    #[serde(default)]
    pub idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ELinkResponse {
    #[serde(default)]
    pub linksets: Vec<ELinkSet>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ELinkSet {
    #[serde(rename = "linksetdbs", default)]
    pub linkset_dbs: Option<Vec<ELinkSetDb>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ELinkSetDb {
    #[serde(rename = "dbto", default)]
    pub db_to: String,
    #[serde(rename = "linkname")]
    pub link_name: String,
    #[serde(default)]
    pub links: Vec<String>,
}

impl ELinkResponse {
    /// Linked ids for `link_name` into database `db_to`, in response order.
    ///
    /// Link sets that omit `dbto` are matched on the link name alone.
    pub fn links_named(self, db_to: &str, link_name: &str) -> Vec<String> {
        self.linksets
            .into_iter()
            .filter_map(|set| set.linkset_dbs)
            .flatten()
            .filter(|db| db.link_name == link_name && (db.db_to.is_empty() || db.db_to == db_to))
            .flat_map(|db| db.links)
            .collect()
    }
}
