use actix_web::{
    delete, error, get, http::StatusCode, post, web, HttpResponse, Responder, ResponseError,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::capacity::Venue;
use crate::errors::ReservationError;
use crate::models::{ApiResponse, ReservationRequest, SlotQuery, SweepResponse, TripleQuery};
use crate::service::ReservationService;

impl ResponseError for ReservationError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReservationError::InvalidInput(_) | ReservationError::OutOfHours { .. } | ReservationError::TooSoon { .. } => {
                StatusCode::BAD_REQUEST
            }
            ReservationError::NoCapacity { .. }
            | ReservationError::DuplicateBooking { .. }
            | ReservationError::InvalidState { .. } => StatusCode::CONFLICT,
            ReservationError::NotFound(_) => StatusCode::NOT_FOUND,
            ReservationError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if !self.is_rejection() {
            log::error!("Request failed: {}", self);
        }
        HttpResponse::build(self.status_code()).json(ApiResponse { message: self.to_string() })
    }
}

fn bad_request(detail: String) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse { message: detail })
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let detail = err.to_string();
        let response = match err {
            error::JsonPayloadError::ContentType => HttpResponse::UnsupportedMediaType().body("Unsupported Media Type"),
            error::JsonPayloadError::Deserialize(ref err) => bad_request(err.to_string()),
            _ => bad_request(detail),
        };
        error::InternalError::from_response(err, response).into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let response = bad_request(err.to_string());
        error::InternalError::from_response(err, response).into()
    })
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        let response = bad_request(err.to_string());
        error::InternalError::from_response(err, response).into()
    })
}

#[derive(Debug, Deserialize)]
struct OldReservationsQuery {
    #[serde(default = "default_months_back")]
    months_back: u32,
}

fn default_months_back() -> u32 {
    2
}

#[post("/reserve")]
async fn reserve(
    service: web::Data<ReservationService>,
    form: web::Json<ReservationRequest>,
) -> actix_web::Result<impl Responder> {
    let reservation = web::block(move || service.reserve(form.into_inner())).await??;
    Ok(HttpResponse::Created().json(reservation))
}

#[get("/check")]
async fn check(service: web::Data<ReservationService>, query: web::Query<SlotQuery>) -> actix_web::Result<impl Responder> {
    let report = web::block(move || service.check_availability(&query)).await??;
    Ok(HttpResponse::Ok().json(report))
}

#[get("/reservations")]
async fn list_reservations(service: web::Data<ReservationService>) -> actix_web::Result<impl Responder> {
    let all = web::block(move || service.list_all()).await??;
    Ok(HttpResponse::Ok().json(all))
}

#[get("/reservations/lookup")]
async fn lookup_reservation(
    service: web::Data<ReservationService>,
    query: web::Query<TripleQuery>,
) -> actix_web::Result<impl Responder> {
    let found = web::block(move || service.find_by_triple(&query)).await??;
    Ok(HttpResponse::Ok().json(found))
}

#[get("/reservations/date/{date}")]
async fn reservations_by_date(
    service: web::Data<ReservationService>,
    path: web::Path<NaiveDate>,
) -> actix_web::Result<impl Responder> {
    let date = path.into_inner();
    let found = web::block(move || service.list_by_date(date)).await??;
    Ok(HttpResponse::Ok().json(found))
}

#[get("/reservations/owner/{owner_id}")]
async fn reservations_by_owner(
    service: web::Data<ReservationService>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    let owner_id = path.into_inner();
    let found = web::block(move || service.list_by_owner(&owner_id)).await??;
    Ok(HttpResponse::Ok().json(found))
}

#[get("/reservations/{id}")]
async fn get_reservation(
    service: web::Data<ReservationService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let reservation = web::block(move || service.get(id)).await??;
    Ok(HttpResponse::Ok().json(reservation))
}

#[post("/reservations/{id}/confirm")]
async fn confirm_reservation(
    service: web::Data<ReservationService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let reservation = web::block(move || service.confirm(id)).await??;
    Ok(HttpResponse::Ok().json(reservation))
}

#[post("/reservations/{id}/cancel")]
async fn cancel_reservation(
    service: web::Data<ReservationService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let reservation = web::block(move || service.cancel(id)).await??;
    Ok(HttpResponse::Ok().json(reservation))
}

#[post("/reservations/{id}/preorder")]
async fn mark_preorder(
    service: web::Data<ReservationService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let reservation = web::block(move || service.mark_preorder(id)).await??;
    Ok(HttpResponse::Ok().json(reservation))
}

#[delete("/reservations/{id}/preorder")]
async fn remove_preorder(
    service: web::Data<ReservationService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let reservation = web::block(move || service.remove_preorder(id)).await??;
    Ok(HttpResponse::Ok().json(reservation))
}

#[delete("/reservations/{id}")]
async fn delete_reservation(
    service: web::Data<ReservationService>,
    path: web::Path<Uuid>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    web::block(move || service.delete(id)).await??;
    Ok(HttpResponse::Ok().json(ApiResponse {
        message: format!("Reservation {} deleted", id),
    }))
}

#[post("/cleanup_cancelled")]
async fn cleanup_cancelled(service: web::Data<ReservationService>) -> actix_web::Result<impl Responder> {
    let deleted_count = web::block(move || service.sweep()).await??;
    Ok(HttpResponse::Ok().json(SweepResponse {
        deleted_count,
        message: format!("Deleted {} cancelled reservations", deleted_count),
    }))
}

#[get("/statistics")]
async fn statistics(service: web::Data<ReservationService>) -> actix_web::Result<impl Responder> {
    let stats = web::block(move || service.statistics()).await??;
    Ok(HttpResponse::Ok().json(stats))
}

#[get("/old_reservations")]
async fn old_reservations(
    service: web::Data<ReservationService>,
    query: web::Query<OldReservationsQuery>,
) -> actix_web::Result<impl Responder> {
    let months_back = query.months_back;
    let old = web::block(move || service.old_reservations(months_back)).await??;
    Ok(HttpResponse::Ok().json(old))
}

#[get("/venues")]
async fn venues(service: web::Data<ReservationService>) -> impl Responder {
    let venues: Vec<Venue> = service.venues().iter().cloned().collect();
    HttpResponse::Ok().json(venues)
}

/// Registers every endpoint. Literal `/reservations/...` paths go ahead of
/// `/reservations/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .service(reserve)
        .service(check)
        .service(list_reservations)
        .service(lookup_reservation)
        .service(reservations_by_date)
        .service(reservations_by_owner)
        .service(get_reservation)
        .service(confirm_reservation)
        .service(cancel_reservation)
        .service(mark_preorder)
        .service(remove_preorder)
        .service(delete_reservation)
        .service(cleanup_cancelled)
        .service(statistics)
        .service(old_reservations)
        .service(venues);
}
