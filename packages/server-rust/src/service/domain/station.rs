//! Station registry service.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

use lastmile_core::{LatLng, Record, Station, UpsertStore};

use super::{fetch_record, list_records};
use crate::network::{forward, respond, GatewayResult, ListQuery};
use crate::proto;
use crate::proto::station_service_client::StationServiceClient;
use crate::proto::station_service_server::{StationService, StationServiceServer};
use crate::service::ids::id_or_new;
use crate::service::status::{call_context, store_status};

/// gRPC handler for `lastmile.v1.StationService`.
pub struct StationServer<S> {
    stations: Arc<S>,
}

impl<S: UpsertStore<Station>> StationServer<S> {
    #[must_use]
    pub fn new(stations: S) -> Self {
        Self {
            stations: Arc::new(stations),
        }
    }

    /// Wraps the handler in the generated tonic service.
    #[must_use]
    pub fn into_service(self) -> StationServiceServer<Self> {
        StationServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<S: UpsertStore<Station>> StationService for StationServer<S> {
    /// Creates or replaces a station. A blank id is generated.
    async fn upsert_station(
        &self,
        request: Request<proto::UpsertStationRequest>,
    ) -> Result<Response<proto::UpsertStationResponse>, Status> {
        let ctx = call_context(&request);
        let input = request
            .into_inner()
            .station
            .ok_or_else(|| Status::invalid_argument("station is required"))?;
        let station = Station {
            station_id: id_or_new(&input.station_id, "station"),
            name: input.name.trim().to_string(),
            location: input.location.map(|loc| LatLng {
                latitude: loc.latitude,
                longitude: loc.longitude,
            }),
            nearby_area_ids: input.nearby_area_ids,
        };
        station.validate().map_err(store_status)?;
        self.stations
            .upsert(&ctx, &station)
            .await
            .map_err(store_status)?;
        Ok(Response::new(proto::UpsertStationResponse {
            station: Some(station.into()),
        }))
    }

    async fn get_station(
        &self,
        request: Request<proto::GetStationRequest>,
    ) -> Result<Response<proto::GetStationResponse>, Status> {
        let ctx = call_context(&request);
        let station =
            fetch_record(self.stations.as_ref(), &ctx, "station_id", &request.get_ref().station_id)
                .await?;
        Ok(Response::new(proto::GetStationResponse {
            station: Some(station.into()),
        }))
    }

    async fn list_stations(
        &self,
        request: Request<proto::ListStationsRequest>,
    ) -> Result<Response<proto::ListStationsResponse>, Status> {
        let ctx = call_context(&request);
        let req = request.get_ref();
        let (stations, next_page_token) =
            list_records(self.stations.as_ref(), &ctx, req.page_size, &req.page_token).await?;
        Ok(Response::new(proto::ListStationsResponse {
            stations: stations.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }
}

impl From<Station> for proto::Station {
    fn from(station: Station) -> Self {
        Self {
            station_id: station.station_id,
            name: station.name,
            location: station.location.map(|loc| proto::LatLng {
                latitude: loc.latitude,
                longitude: loc.longitude,
            }),
            nearby_area_ids: station.nearby_area_ids,
        }
    }
}

// ---------------------------------------------------------------------------
// REST gateway
// ---------------------------------------------------------------------------

type Client = StationServiceClient<Channel>;

/// REST routes translating onto `StationService` over `channel`.
#[must_use]
pub fn gateway_routes(channel: Channel) -> Router {
    Router::new()
        .route("/v1/stations", post(create_station).get(list_stations))
        .route(
            "/v1/stations/{station_id}",
            get(get_station).put(replace_station),
        )
        .with_state(StationServiceClient::new(channel))
}

async fn create_station(
    State(mut client): State<Client>,
    headers: HeaderMap,
    body: Result<Json<proto::Station>, JsonRejection>,
) -> GatewayResult<proto::UpsertStationResponse> {
    let Json(station) = body?;
    let request = proto::UpsertStationRequest {
        station: Some(station),
    };
    respond(client.upsert_station(forward(&headers, request)).await)
}

/// `PUT /v1/stations/{station_id}`: the path id overrides any id in the body.
async fn replace_station(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(station_id): Path<String>,
    body: Result<Json<proto::Station>, JsonRejection>,
) -> GatewayResult<proto::UpsertStationResponse> {
    let Json(mut station) = body?;
    station.station_id = station_id;
    let request = proto::UpsertStationRequest {
        station: Some(station),
    };
    respond(client.upsert_station(forward(&headers, request)).await)
}

async fn get_station(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(station_id): Path<String>,
) -> GatewayResult<proto::GetStationResponse> {
    let request = proto::GetStationRequest { station_id };
    respond(client.get_station(forward(&headers, request)).await)
}

async fn list_stations(
    State(mut client): State<Client>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> GatewayResult<proto::ListStationsResponse> {
    let Query(query) = query?;
    let request = proto::ListStationsRequest {
        page_size: query.page_size.unwrap_or_default(),
        page_token: query.page_token.unwrap_or_default(),
    };
    respond(client.list_stations(forward(&headers, request)).await)
}

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;
    use crate::storage::MemoryStore;

    fn upsert(id: &str, name: &str, location: Option<(f64, f64)>) -> Request<proto::UpsertStationRequest> {
        Request::new(proto::UpsertStationRequest {
            station: Some(proto::Station {
                station_id: id.into(),
                name: name.into(),
                location: location.map(|(latitude, longitude)| proto::LatLng {
                    latitude,
                    longitude,
                }),
                nearby_area_ids: vec!["area-1".into()],
            }),
        })
    }

    #[tokio::test]
    async fn upsert_generates_id_and_replaces() {
        let server = StationServer::new(MemoryStore::new());

        let created = server
            .upsert_station(upsert("", " Indiranagar ", Some((12.97, 77.64))))
            .await
            .unwrap()
            .into_inner()
            .station
            .unwrap();
        assert!(created.station_id.starts_with("station_"));
        assert_eq!(created.name, "Indiranagar");

        server
            .upsert_station(upsert(&created.station_id, "Indiranagar Metro", Some((12.98, 77.64))))
            .await
            .unwrap();

        let fetched = server
            .get_station(Request::new(proto::GetStationRequest {
                station_id: created.station_id.clone(),
            }))
            .await
            .unwrap()
            .into_inner()
            .station
            .unwrap();
        assert_eq!(fetched.name, "Indiranagar Metro");
        assert_eq!(fetched.nearby_area_ids, ["area-1"]);
    }

    #[tokio::test]
    async fn upsert_validates_name_and_location() {
        let server = StationServer::new(MemoryStore::new());

        let status = server
            .upsert_station(Request::new(proto::UpsertStationRequest { station: None }))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "station is required");

        let cases = [
            (upsert("s-1", " ", Some((1.0, 1.0))), "name is required"),
            (upsert("s-1", "Hub", None), "location is required"),
            (upsert("s-1", "Hub", Some((100.0, 1.0))), "latitude out of range"),
            (upsert("s-1", "Hub", Some((1.0, 200.0))), "longitude out of range"),
            (upsert("s-1", "Hub", Some((f64::NAN, 1.0))), "location has invalid coordinates"),
            (upsert("s-1", "Hub", Some((1.0, f64::INFINITY))), "location has invalid coordinates"),
        ];
        for (request, message) in cases {
            let status = server.upsert_station(request).await.unwrap_err();
            assert_eq!(status.code(), Code::InvalidArgument);
            assert_eq!(status.message(), message);
        }
    }

    #[tokio::test]
    async fn get_and_list_stations() {
        let server = StationServer::new(MemoryStore::new());
        for id in ["s-2", "s-1"] {
            server
                .upsert_station(upsert(id, "Hub", Some((0.0, 0.0))))
                .await
                .unwrap();
        }

        let status = server
            .get_station(Request::new(proto::GetStationRequest {
                station_id: "s-9".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "station not found");

        let page = server
            .list_stations(Request::new(proto::ListStationsRequest {
                page_size: 0,
                page_token: String::new(),
            }))
            .await
            .unwrap()
            .into_inner();
        let ids: Vec<_> = page.stations.iter().map(|s| s.station_id.as_str()).collect();
        assert_eq!(ids, ["s-1", "s-2"]);
        assert!(page.next_page_token.is_empty());

        let status = server
            .list_stations(Request::new(proto::ListStationsRequest {
                page_size: 10,
                page_token: "next".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "invalid page_token");
    }
}
