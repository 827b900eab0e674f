//! Rider and driver profile service.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};

use lastmile_core::{DriverProfile, RecordStore, RiderProfile};

use super::{create_record, fetch_record, list_records};
use crate::network::{forward, respond, GatewayResult, ListQuery};
use crate::proto;
use crate::proto::user_service_client::UserServiceClient;
use crate::proto::user_service_server::{UserService, UserServiceServer};
use crate::service::ids::id_or_new;
use crate::service::status::call_context;

/// gRPC handler for `lastmile.v1.UserService`.
pub struct UserServer<R, D> {
    riders: Arc<R>,
    drivers: Arc<D>,
}

impl<R, D> UserServer<R, D>
where
    R: RecordStore<RiderProfile>,
    D: RecordStore<DriverProfile>,
{
    #[must_use]
    pub fn new(riders: R, drivers: D) -> Self {
        Self {
            riders: Arc::new(riders),
            drivers: Arc::new(drivers),
        }
    }

    /// Wraps the handler in the generated tonic service.
    #[must_use]
    pub fn into_service(self) -> UserServiceServer<Self> {
        UserServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl<R, D> UserService for UserServer<R, D>
where
    R: RecordStore<RiderProfile>,
    D: RecordStore<DriverProfile>,
{
    async fn create_rider_profile(
        &self,
        request: Request<proto::CreateRiderProfileRequest>,
    ) -> Result<Response<proto::CreateRiderProfileResponse>, Status> {
        let ctx = call_context(&request);
        let profile = request
            .into_inner()
            .profile
            .ok_or_else(|| Status::invalid_argument("profile is required"))?;
        let rider = RiderProfile {
            rider_id: id_or_new(&profile.rider_id, "rider"),
            name: profile.name.trim().to_string(),
            phone: profile.phone.trim().to_string(),
        };
        let rider = create_record(self.riders.as_ref(), &ctx, rider).await?;
        Ok(Response::new(proto::CreateRiderProfileResponse {
            profile: Some(rider.into()),
        }))
    }

    async fn get_rider_profile(
        &self,
        request: Request<proto::GetRiderProfileRequest>,
    ) -> Result<Response<proto::GetRiderProfileResponse>, Status> {
        let ctx = call_context(&request);
        let rider =
            fetch_record(self.riders.as_ref(), &ctx, "rider_id", &request.get_ref().rider_id).await?;
        Ok(Response::new(proto::GetRiderProfileResponse {
            profile: Some(rider.into()),
        }))
    }

    async fn list_rider_profiles(
        &self,
        request: Request<proto::ListRiderProfilesRequest>,
    ) -> Result<Response<proto::ListRiderProfilesResponse>, Status> {
        let ctx = call_context(&request);
        let req = request.get_ref();
        let (riders, next_page_token) =
            list_records(self.riders.as_ref(), &ctx, req.page_size, &req.page_token).await?;
        Ok(Response::new(proto::ListRiderProfilesResponse {
            profiles: riders.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }

    async fn create_driver_profile(
        &self,
        request: Request<proto::CreateDriverProfileRequest>,
    ) -> Result<Response<proto::CreateDriverProfileResponse>, Status> {
        let ctx = call_context(&request);
        let profile = request
            .into_inner()
            .profile
            .ok_or_else(|| Status::invalid_argument("profile is required"))?;
        let driver = DriverProfile {
            driver_id: id_or_new(&profile.driver_id, "driver"),
            name: profile.name.trim().to_string(),
            phone: profile.phone.trim().to_string(),
            vehicle_id: profile.vehicle_id.trim().to_string(),
        };
        let driver = create_record(self.drivers.as_ref(), &ctx, driver).await?;
        Ok(Response::new(proto::CreateDriverProfileResponse {
            profile: Some(driver.into()),
        }))
    }

    async fn get_driver_profile(
        &self,
        request: Request<proto::GetDriverProfileRequest>,
    ) -> Result<Response<proto::GetDriverProfileResponse>, Status> {
        let ctx = call_context(&request);
        let driver =
            fetch_record(self.drivers.as_ref(), &ctx, "driver_id", &request.get_ref().driver_id)
                .await?;
        Ok(Response::new(proto::GetDriverProfileResponse {
            profile: Some(driver.into()),
        }))
    }

    async fn list_driver_profiles(
        &self,
        request: Request<proto::ListDriverProfilesRequest>,
    ) -> Result<Response<proto::ListDriverProfilesResponse>, Status> {
        let ctx = call_context(&request);
        let req = request.get_ref();
        let (drivers, next_page_token) =
            list_records(self.drivers.as_ref(), &ctx, req.page_size, &req.page_token).await?;
        Ok(Response::new(proto::ListDriverProfilesResponse {
            profiles: drivers.into_iter().map(Into::into).collect(),
            next_page_token,
        }))
    }
}

impl From<RiderProfile> for proto::RiderProfile {
    fn from(rider: RiderProfile) -> Self {
        Self {
            rider_id: rider.rider_id,
            name: rider.name,
            phone: rider.phone,
        }
    }
}

impl From<DriverProfile> for proto::DriverProfile {
    fn from(driver: DriverProfile) -> Self {
        Self {
            driver_id: driver.driver_id,
            name: driver.name,
            phone: driver.phone,
            vehicle_id: driver.vehicle_id,
        }
    }
}

// ---------------------------------------------------------------------------
// REST gateway
// ---------------------------------------------------------------------------

type Client = UserServiceClient<Channel>;

/// REST routes translating onto `UserService` over `channel`.
#[must_use]
pub fn gateway_routes(channel: Channel) -> Router {
    Router::new()
        .route("/v1/riders", post(create_rider).get(list_riders))
        .route("/v1/riders/{rider_id}", get(get_rider))
        .route("/v1/drivers", post(create_driver).get(list_drivers))
        .route("/v1/drivers/{driver_id}", get(get_driver))
        .with_state(UserServiceClient::new(channel))
}

async fn create_rider(
    State(mut client): State<Client>,
    headers: HeaderMap,
    body: Result<Json<proto::RiderProfile>, JsonRejection>,
) -> GatewayResult<proto::CreateRiderProfileResponse> {
    let Json(profile) = body?;
    let request = proto::CreateRiderProfileRequest {
        profile: Some(profile),
    };
    respond(client.create_rider_profile(forward(&headers, request)).await)
}

async fn get_rider(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(rider_id): Path<String>,
) -> GatewayResult<proto::GetRiderProfileResponse> {
    let request = proto::GetRiderProfileRequest { rider_id };
    respond(client.get_rider_profile(forward(&headers, request)).await)
}

async fn list_riders(
    State(mut client): State<Client>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> GatewayResult<proto::ListRiderProfilesResponse> {
    let Query(query) = query?;
    let request = proto::ListRiderProfilesRequest {
        page_size: query.page_size.unwrap_or_default(),
        page_token: query.page_token.unwrap_or_default(),
    };
    respond(client.list_rider_profiles(forward(&headers, request)).await)
}

async fn create_driver(
    State(mut client): State<Client>,
    headers: HeaderMap,
    body: Result<Json<proto::DriverProfile>, JsonRejection>,
) -> GatewayResult<proto::CreateDriverProfileResponse> {
    let Json(profile) = body?;
    let request = proto::CreateDriverProfileRequest {
        profile: Some(profile),
    };
    respond(client.create_driver_profile(forward(&headers, request)).await)
}

async fn get_driver(
    State(mut client): State<Client>,
    headers: HeaderMap,
    Path(driver_id): Path<String>,
) -> GatewayResult<proto::GetDriverProfileResponse> {
    let request = proto::GetDriverProfileRequest { driver_id };
    respond(client.get_driver_profile(forward(&headers, request)).await)
}

async fn list_drivers(
    State(mut client): State<Client>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> GatewayResult<proto::ListDriverProfilesResponse> {
    let Query(query) = query?;
    let request = proto::ListDriverProfilesRequest {
        page_size: query.page_size.unwrap_or_default(),
        page_token: query.page_token.unwrap_or_default(),
    };
    respond(client.list_driver_profiles(forward(&headers, request)).await)
}

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;
    use crate::storage::MemoryStore;

    type MemoryUsers = UserServer<MemoryStore<RiderProfile>, MemoryStore<DriverProfile>>;

    fn server() -> MemoryUsers {
        UserServer::new(MemoryStore::new(), MemoryStore::new())
    }

    fn rider(id: &str, name: &str, phone: &str) -> Request<proto::CreateRiderProfileRequest> {
        Request::new(proto::CreateRiderProfileRequest {
            profile: Some(proto::RiderProfile {
                rider_id: id.into(),
                name: name.into(),
                phone: phone.into(),
            }),
        })
    }

    #[tokio::test]
    async fn create_rider_trims_and_generates_id() {
        let server = server();
        let created = server
            .create_rider_profile(rider("", "  Asha ", " +91-98450 "))
            .await
            .unwrap()
            .into_inner()
            .profile
            .unwrap();

        assert!(created.rider_id.starts_with("rider_"));
        assert_eq!(created.rider_id.len(), "rider_".len() + 16);
        assert_eq!(created.name, "Asha");
        assert_eq!(created.phone, "+91-98450");

        let fetched = server
            .get_rider_profile(Request::new(proto::GetRiderProfileRequest {
                rider_id: format!(" {} ", created.rider_id),
            }))
            .await
            .unwrap()
            .into_inner()
            .profile
            .unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_rider_rejects_missing_input() {
        let server = server();

        let status = server
            .create_rider_profile(Request::new(proto::CreateRiderProfileRequest { profile: None }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "profile is required");

        let status = server
            .create_rider_profile(rider("r-1", "   ", "555"))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "name is required");

        let status = server
            .create_rider_profile(rider("r-1", "Asha", ""))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "phone is required");
    }

    #[tokio::test]
    async fn duplicate_and_missing_riders() {
        let server = server();
        server
            .create_rider_profile(rider("r-1", "Asha", "555"))
            .await
            .unwrap();

        let status = server
            .create_rider_profile(rider("r-1", "Ravi", "556"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::AlreadyExists);
        assert_eq!(status.message(), "rider already exists");

        let status = server
            .get_rider_profile(Request::new(proto::GetRiderProfileRequest {
                rider_id: "r-404".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "rider not found");

        let status = server
            .get_rider_profile(Request::new(proto::GetRiderProfileRequest {
                rider_id: "  ".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "rider_id is required");
    }

    #[tokio::test]
    async fn driver_requires_vehicle() {
        let server = server();
        let request = |vehicle_id: &str| {
            Request::new(proto::CreateDriverProfileRequest {
                profile: Some(proto::DriverProfile {
                    driver_id: "d-1".into(),
                    name: "Kiran".into(),
                    phone: "777".into(),
                    vehicle_id: vehicle_id.into(),
                }),
            })
        };

        let status = server.create_driver_profile(request(" ")).await.unwrap_err();
        assert_eq!(status.message(), "vehicle_id is required");

        let created = server
            .create_driver_profile(request("KA-01-1234"))
            .await
            .unwrap()
            .into_inner()
            .profile
            .unwrap();
        assert_eq!(created.driver_id, "d-1");

        let status = server
            .get_driver_profile(Request::new(proto::GetDriverProfileRequest {
                driver_id: "d-2".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "driver not found");
    }

    #[tokio::test]
    async fn list_riders_pages_in_key_order() {
        let server = server();
        for id in ["r-c", "r-a", "r-b"] {
            server
                .create_rider_profile(rider(id, "Name", "555"))
                .await
                .unwrap();
        }

        let first = server
            .list_rider_profiles(Request::new(proto::ListRiderProfilesRequest {
                page_size: 2,
                page_token: String::new(),
            }))
            .await
            .unwrap()
            .into_inner();
        let ids: Vec<_> = first.profiles.iter().map(|p| p.rider_id.as_str()).collect();
        assert_eq!(ids, ["r-a", "r-b"]);
        assert_eq!(first.next_page_token, "2");

        let second = server
            .list_rider_profiles(Request::new(proto::ListRiderProfilesRequest {
                page_size: 2,
                page_token: first.next_page_token,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(second.profiles.len(), 1);
        assert_eq!(second.profiles[0].rider_id, "r-c");
        assert!(second.next_page_token.is_empty());

        let status = server
            .list_driver_profiles(Request::new(proto::ListDriverProfilesRequest {
                page_size: -3,
                page_token: String::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "page_size must be positive");
    }
}
