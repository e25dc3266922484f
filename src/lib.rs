pub mod photometa_core;
