//! Request routing between the metrics endpoint and the application.

mod handler;
mod scrape;
mod table;

pub use handler::{
    FnHandler, Handler, HandlerError, HandlerFuture, HttpResponse, ResponseBody, full_body,
    handler_fn, text_response,
};
pub use scrape::ScrapeRouter;
pub use table::{Mount, RouteError, RouteTable, RouteTableBuilder};
