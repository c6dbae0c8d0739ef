mod tm;

pub use tm::TransverseMercator;
