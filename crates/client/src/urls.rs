//! Request URL construction from the configuration tuple.
//!
//! All paths are derived from the current [`WatcherConfig`]: the host may
//! carry an explicit scheme (`https://couch.internal`); plain hostnames
//! default to `http`.

use std::collections::BTreeMap;

use url::Url;

use seiche_core::{Error, WatcherConfig};

/// Which design-document resource a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignResource {
    View,
    List,
}

impl DesignResource {
    fn segment(self) -> &'static str {
        match self {
            DesignResource::View => "_view",
            DesignResource::List => "_list",
        }
    }
}

fn base(config: &WatcherConfig) -> Result<Url, Error> {
    let raw = if config.host.contains("://") {
        format!("{}:{}/", config.host, config.port)
    } else {
        format!("http://{}:{}/", config.host, config.port)
    };
    Url::parse(&raw).map_err(|e| Error::InvalidUrl(e.to_string()))
}

fn segments(config: &WatcherConfig) -> Result<Url, Error> {
    let url = base(config)?;
    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl(format!("host cannot carry paths: {}", config.host)));
    }
    Ok(url)
}

/// URL for reading or writing a single document. `None` targets the database
/// root, i.e. a create with a store-assigned id.
pub fn document_url(config: &WatcherConfig, id: Option<&str>) -> Result<Url, Error> {
    let mut url = segments(config)?;
    {
        let mut path = url.path_segments_mut().map_err(|_| Error::InvalidUrl(config.host.clone()))?;
        path.pop_if_empty().push(&config.database);
        if let Some(id) = id {
            path.push(id);
        }
    }
    Ok(url)
}

/// URL for the continuous change feed filtered to the watched id-set.
///
/// The id list itself travels in the POST body (`doc_ids`), not the query
/// string, so it cannot overflow URL length limits.
pub fn changes_url(config: &WatcherConfig) -> Result<Url, Error> {
    let mut url = segments(config)?;
    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(config.host.clone()))?
        .pop_if_empty()
        .push(&config.database)
        .push("_changes");
    url.query_pairs_mut()
        .append_pair("feed", "continuous")
        .append_pair("filter", "_doc_ids")
        .append_pair("include_docs", "true")
        .append_pair("since", "now");
    Ok(url)
}

/// URL for invoking a named view or list on a design document.
///
/// Options are appended as query pairs in key order, so the same options
/// always produce the same URL.
pub fn design_url(
    config: &WatcherConfig,
    design_name: &str,
    resource: DesignResource,
    resource_name: &str,
    options: Option<&BTreeMap<String, String>>,
) -> Result<Url, Error> {
    let mut url = segments(config)?;
    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(config.host.clone()))?
        .pop_if_empty()
        .push(&config.database)
        .push("_design")
        .push(design_name)
        .push(resource.segment())
        .push(resource_name);

    if let Some(options) = options {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in options {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use seiche_core::Headers;

    fn config() -> WatcherConfig {
        WatcherConfig {
            ids: vec!["a".to_string()],
            database: "tasks".to_string(),
            host: "localhost".to_string(),
            headers: Headers::new(),
            port: 5984,
        }
    }

    #[test]
    fn test_document_url() {
        let url = document_url(&config(), Some("a")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/tasks/a");
    }

    #[test]
    fn test_document_url_without_id() {
        let url = document_url(&config(), None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/tasks");
    }

    #[test]
    fn test_changes_url() {
        let url = changes_url(&config()).unwrap();
        assert_eq!(url.path(), "/tasks/_changes");
        let query = url.query().unwrap();
        assert!(query.contains("feed=continuous"));
        assert!(query.contains("filter=_doc_ids"));
        assert!(query.contains("include_docs=true"));
        assert!(query.contains("since=now"));
    }

    #[test]
    fn test_design_view_url() {
        let mut options = BTreeMap::new();
        options.insert("limit".to_string(), "10".to_string());
        options.insert("descending".to_string(), "true".to_string());

        let url = design_url(&config(), "app", DesignResource::View, "by_name", Some(&options)).unwrap();
        assert_eq!(url.path(), "/tasks/_design/app/_view/by_name");
        assert_eq!(url.query(), Some("descending=true&limit=10"));
    }

    #[test]
    fn test_design_list_url() {
        let url = design_url(&config(), "app", DesignResource::List, "render", None).unwrap();
        assert_eq!(url.path(), "/tasks/_design/app/_list/render");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_host_with_scheme() {
        let mut cfg = config();
        cfg.host = "https://couch.internal".to_string();
        cfg.port = 443;

        let url = document_url(&cfg, Some("a")).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("couch.internal"));
    }

    #[test]
    fn test_ids_escape() {
        let url = document_url(&config(), Some("a/b c")).unwrap();
        assert_eq!(url.path(), "/tasks/a%2Fb%20c");
    }
}
