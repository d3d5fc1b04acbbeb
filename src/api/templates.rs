use actix_web::{
    get, put,
    web::{self, Json},
    HttpResponse, Responder, Scope,
};
use serde::{Deserialize, Serialize};

use crate::{db::template::Template, error::Error, service::Service};

#[get("")]
async fn list_templates(
    service: web::Data<Service>,
    path: web::Path<String>,
) -> Result<Json<Vec<Template>>, Error> {
    service.list_templates(&*path).await.map(Json)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetTemplateRequest {
    pub body: String,
}

#[put("/{language}")]
async fn set_template(
    service: web::Data<Service>,
    path: web::Path<(String, String)>,
    data: Json<SetTemplateRequest>,
) -> Result<impl Responder, Error> {
    let (survey, language) = &*path;
    service.set_template(survey, language, &data.body).await?;

    Ok(HttpResponse::Ok())
}

pub fn service() -> Scope {
    web::scope("/{survey}/templates")
        .service(list_templates)
        .service(set_template)
}
