//! Cross-origin headers for browser clients.

use crate::protocol::Response;

const EXPOSE_HEADERS: &str =
    "Method, Type, Cinp-Version, Count, Position, Total, Multi-Object, Object-Id, Id-Only";
const ALLOW_HEADERS: &str =
    "Accept, Cinp-Version, Auth-Id, Auth-Token, Filter, Content-Type, Count, Position, Multi-Object, Id-Only";

/// Headers added to every response when an allow list is configured.
pub fn apply(response: &mut Response, allow_list: &[String]) {
    response
        .header_map
        .insert("Access-Control-Allow-Origin".into(), allow_list.join(", "));
    response
        .header_map
        .insert("Access-Control-Expose-Headers".into(), EXPOSE_HEADERS.into());
}

/// Preflight headers added to OPTIONS responses.
pub fn apply_preflight(response: &mut Response) {
    if let Some(allow) = response.header("Allow").map(str::to_string) {
        response
            .header_map
            .insert("Access-Control-Allow-Methods".into(), allow);
    }
    response
        .header_map
        .insert("Access-Control-Allow-Headers".into(), ALLOW_HEADERS.into());
}
