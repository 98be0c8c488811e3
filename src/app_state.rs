use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{
    config::AppConfig,
    session::{Session, StatusBoard},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    // Una única sesión activa; cada interacción la bloquea hasta terminar.
    pub session: Arc<tokio::sync::Mutex<Session>>,
    // Se lee sin tomar el lock de la sesión.
    pub status: StatusBoard,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        session: Session,
        shutdown_sender: Option<oneshot::Sender<()>>,
    ) -> Self {
        Self {
            config,
            status: session.status_board(),
            session: Arc::new(tokio::sync::Mutex::new(session)),
            shutdown_sender: Arc::new(Mutex::new(shutdown_sender)),
        }
    }
}
