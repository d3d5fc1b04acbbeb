use actix_web::{get, web, Scope};
use serde::{Deserialize, Serialize};

use crate::service::Service;

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchStatus {
    pub pending: usize,
    pub draining: bool,
    pub batch_size: usize,
    pub window_ms: u64,
}

#[get("")]
async fn status(service: web::Data<Service>) -> web::Json<DispatchStatus> {
    let queue = service.queue();

    web::Json(DispatchStatus {
        pending: queue.pending(),
        draining: queue.is_draining(),
        batch_size: queue.batch_size(),
        window_ms: queue.window().as_millis() as u64,
    })
}

pub fn service() -> Scope {
    web::scope("/dispatch").service(status)
}
