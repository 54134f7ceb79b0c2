use serde::{Deserialize, Serialize};
use warden_dns_domain::{AutoClient, Client};

#[derive(Debug, Serialize)]
pub struct ClientsResponse {
    pub clients: Vec<Client>,
    pub auto_clients: Vec<AutoClient>,
}

#[derive(Debug, Deserialize)]
pub struct ClientDeleteRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientUpdateRequest {
    pub name: String,
    pub data: Client,
}

#[derive(Debug, Deserialize)]
pub struct ClientFindQuery {
    pub ip0: String,
}
