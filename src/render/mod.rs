// ============================================================================
// lumen - Render Surface
// App assembly, server-side rendering, and hydration
// ============================================================================

pub mod app;
pub mod hydrate;
pub mod ssr;

pub use app::{App, AppBuilder, MountHandle};
pub use ssr::{annotate, render_to_string};
