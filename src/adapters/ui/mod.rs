pub mod app;
pub mod detection_view;
pub mod editor;
pub mod models_view;
pub mod notifications;
pub mod roi_view;
pub mod rules_view;
pub mod state;
