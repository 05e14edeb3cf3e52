use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{Map, Value};

use crate::error::ClientError;

pub const PROTOCOL_VERSION: &str = "0.9";

const CAPTURED_HEADERS: [&str; 8] = [
    "Position",
    "Count",
    "Total",
    "Type",
    "Verb",
    "Multi-Object",
    "Object-Id",
    "Id-Only",
];

/// Paging information returned by LIST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageInfo {
    pub position: usize,
    pub count: usize,
    pub total: usize,
}

/// One page of a LIST.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListResult {
    /// Object URIs, or bare ids when requested with `id_only`.
    pub ids: Vec<String>,
    pub page: PageInfo,
}

/// Filter and paging options for LIST.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub filter: Option<String>,
    pub values: Option<Map<String, Value>>,
    pub position: usize,
    pub count: usize,
    pub id_only: bool,
}

impl ListRequest {
    pub fn new() -> Self {
        Self {
            count: 10,
            ..Self::default()
        }
    }

    pub fn filter(mut self, name: impl Into<String>, values: Map<String, Value>) -> Self {
        self.filter = Some(name.into());
        self.values = Some(values);
        self
    }

    pub fn page(mut self, position: usize, count: usize) -> Self {
        self.position = position;
        self.count = count;
        self
    }

    pub fn id_only(mut self) -> Self {
        self.id_only = true;
        self
    }
}

/// A decoded protocol response.
#[derive(Debug, Clone)]
struct Reply {
    status: u16,
    data: Option<Value>,
    headers: HashMap<&'static str, String>,
}

impl Reply {
    fn header_usize(&self, name: &str) -> Result<usize, ClientError> {
        self.headers
            .get(name)
            .ok_or_else(|| ClientError::UnexpectedResponse(format!("missing {name} header")))?
            .parse()
            .map_err(|_| ClientError::UnexpectedResponse(format!("{name} header is not an integer")))
    }
}

/// Async client for a resource protocol server.
pub struct CinpClient {
    client: Client,
    host: String,
    root_path: String,
    auth: Option<(String, String)>,
}

impl CinpClient {
    /// Create a client for `host` (e.g. `http://localhost:8080`, no
    /// trailing `/`) serving the API under `root_path` (e.g. `/api/`).
    pub fn new(host: &str, root_path: &str) -> Result<Self, ClientError> {
        Self::with_timeout(host, root_path, Duration::from_secs(30))
    }

    pub fn with_timeout(host: &str, root_path: &str, timeout: Duration) -> Result<Self, ClientError> {
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ClientError::Config("host must start with http(s)://".into()));
        }
        if host.ends_with('/') {
            return Err(ClientError::Config("host must not end with \"/\"".into()));
        }
        if !root_path.starts_with('/') || !root_path.ends_with('/') {
            return Err(ClientError::Config("root path must start and end with \"/\"".into()));
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            host: host.to_string(),
            root_path: root_path.to_string(),
            auth: None,
        })
    }

    /// Set or clear the `Auth-Id`/`Auth-Token` pair sent with every request.
    pub fn set_auth(&mut self, auth: Option<(String, String)>) {
        self.auth = auth;
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    async fn request(
        &self,
        verb: &str,
        uri: &str,
        data: Option<&Value>,
        headers: &[(&str, String)],
    ) -> Result<Reply, ClientError> {
        if !uri.starts_with(&self.root_path) {
            return Err(ClientError::Request(format!(
                "\"{uri}\" is not below \"{}\"",
                self.root_path
            )));
        }
        let method = Method::from_bytes(verb.as_bytes())
            .map_err(|_| ClientError::Request(format!("Invalid Verb (HTTP Method) \"{verb}\"")))?;

        let mut builder = self
            .client
            .request(method, format!("{}{}", self.host, uri))
            .header("Cinp-Version", PROTOCOL_VERSION)
            .header("Content-Type", "application/json;charset=utf-8");
        if let Some((auth_id, auth_token)) = &self.auth {
            builder = builder.header("Auth-Id", auth_id).header("Auth-Token", auth_token);
        }
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        if let Some(data) = data {
            builder = builder.body(serde_json::to_vec(data).map_err(|err| ClientError::Request(err.to_string()))?);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let captured = CAPTURED_HEADERS
            .iter()
            .filter_map(|name| {
                response
                    .headers()
                    .get(*name)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| (*name, value.to_string()))
            })
            .collect();

        let body = response.text().await?;
        let data = if body.trim().is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(&body).ok()
        };
        let message = || {
            data.as_ref()
                .and_then(|data| data.get("message"))
                .and_then(Value::as_str)
                .map_or_else(|| body.chars().take(200).collect(), str::to_string)
        };

        match status {
            200 | 201 | 202 => Ok(Reply {
                status,
                data,
                headers: captured,
            }),
            400 => Err(ClientError::InvalidRequest {
                message: message(),
                detail: data.as_ref().and_then(|data| data.get("detail")).cloned(),
            }),
            401 => Err(ClientError::InvalidSession),
            403 => Err(ClientError::NotAuthorized(message())),
            404 => Err(ClientError::NotFound(message())),
            500 => Err(ClientError::Server(message())),
            other => Err(ClientError::UnexpectedResponse(format!(
                "HTTP code \"{other}\" unhandled"
            ))),
        }
    }

    fn expect(reply: &Reply, verb: &str, status: u16) -> Result<(), ClientError> {
        if reply.status == status {
            Ok(())
        } else {
            Err(ClientError::UnexpectedResponse(format!(
                "Unexpected HTTP Code \"{}\" for {verb}",
                reply.status
            )))
        }
    }

    pub async fn describe(&self, uri: &str) -> Result<Value, ClientError> {
        let reply = self.request("DESCRIBE", uri, None, &[]).await?;
        Self::expect(&reply, "DESCRIBE", 200)?;
        Ok(reply.data.unwrap_or(Value::Null))
    }

    pub async fn list(&self, uri: &str, list: &ListRequest) -> Result<ListResult, ClientError> {
        let mut headers = vec![
            ("Position", list.position.to_string()),
            ("Count", list.count.to_string()),
        ];
        if let Some(filter) = &list.filter {
            headers.push(("Filter", filter.clone()));
        }
        if list.id_only {
            headers.push(("Id-Only", "true".to_string()));
        }
        let values = list.values.clone().map(Value::Object);

        let reply = self.request("LIST", uri, values.as_ref(), &headers).await?;
        Self::expect(&reply, "LIST", 200)?;

        let ids = match &reply.data {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ClientError::UnexpectedResponse("LIST entries must be strings".into())
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(ClientError::UnexpectedResponse(
                    "Response id_list must be a list for LIST".into(),
                ))
            }
        };

        Ok(ListResult {
            ids,
            page: PageInfo {
                position: reply.header_usize("Position")?,
                count: reply.header_usize("Count")?,
                total: reply.header_usize("Total")?,
            },
        })
    }

    /// Every id matching the filter, fetched `chunk_size` at a time.
    pub async fn list_all(
        &self,
        uri: &str,
        filter: Option<(&str, Map<String, Value>)>,
        chunk_size: usize,
    ) -> Result<Vec<String>, ClientError> {
        let mut request = ListRequest::new().page(0, chunk_size.max(1));
        if let Some((name, values)) = filter {
            request = request.filter(name, values);
        }

        let mut ids = Vec::new();
        loop {
            let result = self.list(uri, &request).await?;
            let fetched = result.ids.len();
            ids.extend(result.ids);

            request.position = result.page.position + result.page.count;
            if fetched == 0 || request.position >= result.page.total {
                return Ok(ids);
            }
        }
    }

    pub async fn get(&self, uri: &str, force_multi: bool) -> Result<Value, ClientError> {
        let headers = multi_header(force_multi);
        let reply = self.request("GET", uri, None, &headers).await?;
        Self::expect(&reply, "GET", 200)?;
        expect_map(reply.data, "GET")
    }

    /// Fetch objects of `model_uri` by id in chunks. Returns
    /// `(object uri, object)` pairs in server order.
    pub async fn get_multi(
        &self,
        model_uri: &str,
        ids: &[String],
        chunk_size: usize,
    ) -> Result<Vec<(String, Value)>, ClientError> {
        let mut objects = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(chunk_size.max(1)) {
            let uri = format!("{model_uri}:{}:", chunk.join(":"));
            if let Value::Object(map) = self.get(&uri, true).await? {
                objects.extend(map);
            }
        }
        Ok(objects)
    }

    /// Create an object; returns its URI and stored values.
    pub async fn create(&self, uri: &str, values: Map<String, Value>) -> Result<(String, Value), ClientError> {
        let reply = self
            .request("CREATE", uri, Some(&Value::Object(values)), &[])
            .await?;
        Self::expect(&reply, "CREATE", 201)?;

        let object_id = reply
            .headers
            .get("Object-Id")
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedResponse("Object-Id header missing".into()))?;
        Ok((object_id, expect_map(reply.data, "CREATE")?))
    }

    pub async fn update(
        &self,
        uri: &str,
        values: Map<String, Value>,
        force_multi: bool,
    ) -> Result<Value, ClientError> {
        let headers = multi_header(force_multi);
        let reply = self
            .request("UPDATE", uri, Some(&Value::Object(values)), &headers)
            .await?;
        Self::expect(&reply, "UPDATE", 200)?;
        expect_map(reply.data, "UPDATE")
    }

    pub async fn delete(&self, uri: &str) -> Result<(), ClientError> {
        let reply = self.request("DELETE", uri, None, &[]).await?;
        Self::expect(&reply, "DELETE", 200)
    }

    pub async fn call(
        &self,
        uri: &str,
        args: Map<String, Value>,
        force_multi: bool,
    ) -> Result<Value, ClientError> {
        let headers = multi_header(force_multi);
        let reply = self
            .request("CALL", uri, Some(&Value::Object(args)), &headers)
            .await?;
        Self::expect(&reply, "CALL", 200)?;
        Ok(reply.data.unwrap_or(Value::Null))
    }
}

fn multi_header(force_multi: bool) -> Vec<(&'static str, String)> {
    if force_multi {
        vec![("Multi-Object", "true".to_string())]
    } else {
        Vec::new()
    }
}

fn expect_map(data: Option<Value>, verb: &str) -> Result<Value, ClientError> {
    match data {
        Some(value @ Value::Object(_)) => Ok(value),
        _ => Err(ClientError::UnexpectedResponse(format!(
            "Response values must be a map for {verb}"
        ))),
    }
}
