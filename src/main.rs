mod application;
mod availability;
mod clock;
mod config;
mod domain;
#[cfg(test)]
mod memory;
mod money;
mod pricing;
mod repository;
mod store;
mod transitions;

use std::sync::Arc;

use actix_web::{
    delete, error, get,
    http::{header, StatusCode},
    patch, post,
    web::{self, Data, Json, Path, Query},
    App, HttpRequest, HttpResponse, HttpServer,
};
use application::{
    Application, BookingQuery, CreateBooking, ErrorKind, RegisterCar, UpdateBooking, UpdateCar,
    VerifyCar,
};
use chrono::{DateTime, Utc};
use config::Config;
use domain::{Booking, BookingView, Car, DateRange};
use repository::Repository;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(config.connect_options()?)
        .await?;

    let repository = Arc::new(Repository::new(pool).await?);
    let application = Application::new(
        repository.clone(),
        repository,
        Arc::new(clock::SystemClock),
    );

    http_server(application, &config).await
}

async fn http_server(app: Application, config: &Config) -> anyhow::Result<()> {
    info!(host = %config.host, port = config.port, "starting http server");
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(app.clone()))
            .configure(routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(create_booking)
        .service(list_bookings)
        .service(get_booking)
        .service(update_booking)
        .service(delete_booking)
        .service(register_car)
        .service(update_car)
        .service(verify_car)
        .service(car_availability);
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[get("/health")]
async fn health() -> &'static str {
    "ok"
}

#[post("/bookings")]
async fn create_booking(
    app: Data<Application>,
    req: HttpRequest,
    data: Json<CreateBooking>,
) -> Result<HttpResponse, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    let view = app.create_booking(&actor, data.into_inner()).await?;
    Ok(HttpResponse::Created().json(view))
}

#[get("/bookings")]
async fn list_bookings(
    app: Data<Application>,
    req: HttpRequest,
    query: Query<BookingQuery>,
) -> Result<Json<Vec<Booking>>, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    Ok(Json(app.bookings(&actor, query.into_inner()).await?))
}

#[get("/bookings/{id}")]
async fn get_booking(
    app: Data<Application>,
    req: HttpRequest,
    id: Path<Uuid>,
) -> Result<Json<BookingView>, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    Ok(Json(app.booking(&actor, id.into_inner()).await?))
}

#[patch("/bookings/{id}")]
async fn update_booking(
    app: Data<Application>,
    req: HttpRequest,
    id: Path<Uuid>,
    data: Json<UpdateBooking>,
) -> Result<Json<BookingView>, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    let view = app
        .update_booking(&actor, id.into_inner(), data.into_inner())
        .await?;
    Ok(Json(view))
}

#[delete("/bookings/{id}")]
async fn delete_booking(
    app: Data<Application>,
    req: HttpRequest,
    id: Path<Uuid>,
) -> Result<HttpResponse, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    app.delete_booking(&actor, id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/cars")]
async fn register_car(
    app: Data<Application>,
    req: HttpRequest,
    data: Json<RegisterCar>,
) -> Result<HttpResponse, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    let car = app.register_car(&actor, data.into_inner()).await?;
    Ok(HttpResponse::Created().json(car))
}

#[patch("/cars/{id}")]
async fn update_car(
    app: Data<Application>,
    req: HttpRequest,
    id: Path<Uuid>,
    data: Json<UpdateCar>,
) -> Result<Json<Car>, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    Ok(Json(app.update_car(&actor, id.into_inner(), data.into_inner()).await?))
}

#[post("/cars/{id}/verify")]
async fn verify_car(
    app: Data<Application>,
    req: HttpRequest,
    id: Path<Uuid>,
    data: Json<VerifyCar>,
) -> Result<Json<Car>, application::Error> {
    let actor = app.authenticate(bearer(&req)).await?;
    Ok(Json(app.verify_car(&actor, id.into_inner(), data.verified).await?))
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AvailabilityQuery {
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    exclude_booking_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Availability {
    car_id: Uuid,
    #[serde(flatten)]
    period: DateRange,
    available: bool,
}

#[get("/cars/{id}/availability")]
async fn car_availability(
    app: Data<Application>,
    req: HttpRequest,
    id: Path<Uuid>,
    query: Query<AvailabilityQuery>,
) -> Result<Json<Availability>, application::Error> {
    app.authenticate(bearer(&req)).await?;
    let car_id = id.into_inner();
    let period = DateRange::new(query.start_date, query.end_date)?;
    let available = app
        .is_available(car_id, period, query.exclude_booking_id)
        .await?;
    Ok(Json(Availability {
        car_id,
        period,
        available,
    }))
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl error::ResponseError for application::Error {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind().as_str(),
            message: self.to_string(),
        })
    }

    fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::InvalidStatusTransition => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::DatesNotAvailable | ErrorKind::DuplicateKey | ErrorKind::Conflict => {
                StatusCode::CONFLICT
            }
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
