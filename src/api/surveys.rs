use actix_web::{
    delete, get, post,
    web::{self, Json},
    HttpResponse, Responder, Scope,
};
use serde::{Deserialize, Serialize};
use serde_email::Email;

use crate::{db::survey::SurveyStatistics, error::Error, service::Service};

use super::{respondents, templates};

#[get("")]
async fn list_surveys(service: web::Data<Service>) -> Result<Json<Vec<SurveyStatistics>>, Error> {
    service.list_surveys().await.map(Json)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSurveyResponse {
    pub id: i64,
}

#[post("/{survey}")]
async fn create_survey(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<Json<CreateSurveyResponse>, Error> {
    let id = service.create_survey(&*path).await?;

    Ok(Json(CreateSurveyResponse { id }))
}

#[delete("/{survey}")]
async fn delete_survey(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    service.delete_survey(&*path).await?;

    Ok(HttpResponse::Ok())
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAccepted {
    pub survey: String,
}

/// Accepted as soon as the request is handed to the lifecycle controller;
/// delivery shows up later in the respondents' `invitation_sent` flags.
#[post("/{survey}/start")]
async fn start_survey(service: web::Data<Service>, path: web::Path<String>) -> impl Responder {
    let survey = path.into_inner();

    tracing::info!(survey, "Starting survey");
    drop(service.start_survey(survey.clone()));

    HttpResponse::Accepted().json(DispatchAccepted { survey })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestMessageRequest {
    pub email: Email,
    #[serde(default)]
    pub language: Option<String>,
}

#[post("/{survey}/test")]
async fn send_test_message(
    service: web::Data<Service>,
    path: web::Path<String>,
    data: Json<TestMessageRequest>,
) -> impl Responder {
    let survey = path.into_inner();
    let TestMessageRequest { email, language } = data.into_inner();
    let language = language.unwrap_or_else(|| service.config().default_language().to_owned());

    drop(service.send_test_message(email, survey.clone(), language));

    HttpResponse::Accepted().json(DispatchAccepted { survey })
}

pub fn service() -> Scope {
    web::scope("/surveys")
        .service(respondents::service())
        .service(templates::service())
        .service(list_surveys)
        .service(start_survey)
        .service(send_test_message)
        .service(create_survey)
        .service(delete_survey)
}
