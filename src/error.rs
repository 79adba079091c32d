use thiserror::Error;

/// Errores del motor de reproducción
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// La cola pendiente rechazó el listing
    #[error("La cola está llena (máximo {capacity} elementos)")]
    QueueFull { capacity: usize },

    #[error("No hay una sesión activa en este servidor")]
    NoSession,

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("El nodo de audio no está disponible")]
    NodeUnavailable,

    #[error("Error al conectar al canal de voz: {0}")]
    Voice(String),

    #[error(transparent)]
    Node(#[from] NodeError),

    /// El worker del guild terminó; no debería pasar mientras el registro vive
    #[error("El worker de reproducción del guild ya no existe")]
    WorkerGone,
}

/// Errores del cliente del nodo de audio
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Error HTTP con el nodo: {0}")]
    Http(#[from] reqwest::Error),

    #[error("El nodo respondió {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Respuesta inválida del nodo: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("URL inválida para el nodo: {0}")]
    Url(#[from] url::ParseError),

    #[error("Error en el websocket del nodo: {0}")]
    WebSocket(String),

    /// Todavía no llegó el mensaje `ready` del websocket
    #[error("El nodo aún no tiene sesión")]
    NoSession,
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
