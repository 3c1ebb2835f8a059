pub mod view;

pub use view::SessionView;
