mod common;
mod conditional;
mod routing;
