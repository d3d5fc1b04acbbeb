use actix_web::{
    get, post, put,
    web::{self, Json},
    HttpResponse, Responder, Scope,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::respondent::{NewRespondent, Respondent},
    error::Error,
    message::CorrelationKey,
    service::Service,
};

#[get("")]
async fn list_respondents(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<Json<Vec<Respondent>>, Error> {
    service.list_respondents(&*path).await.map(Json)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddRespondentsResponse {
    pub keys: Vec<CorrelationKey>,
}

#[post("")]
async fn add_respondents(
    service: web::Data<Service>,
    path: web::Path<String>,
    data: Json<Vec<NewRespondent>>,
) -> Result<Json<AddRespondentsResponse>, Error> {
    if data.is_empty() {
        return Err(Error::missing_parameter("respondents"));
    }

    let keys = service.add_respondents(&*path, &data).await?;

    tracing::debug!(survey = %path, added = keys.len(), "Respondents added");

    Ok(Json(AddRespondentsResponse { keys }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityRequest {
    pub eligible: bool,
}

#[put("/{key}/eligibility")]
async fn set_eligibility(
    service: web::Data<Service>,
    path: web::Path<(String, CorrelationKey)>,
    data: Json<EligibilityRequest>,
) -> Result<impl Responder, Error> {
    let (survey, key) = &*path;
    service.set_eligible(survey, key, data.eligible).await?;

    Ok(HttpResponse::Ok())
}

pub fn service() -> Scope {
    web::scope("/{survey}/respondents")
        .service(list_respondents)
        .service(add_respondents)
        .service(set_eligibility)
}
