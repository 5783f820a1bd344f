//! Host side of the engine protocol.
//!
//! An engine host binary wraps one concrete engine build and calls [`serve`]
//! on its stdin and stdout.

use crate::engine::{Connection, ConnectionProperties, Engine};
use crate::error::EngineError;
use dbmig_proto::{is_version_compatible, read_message, write_message, Request, Response};
use std::io::{BufRead, Write};
use tracing::debug;

/// Serve requests until `shutdown` or end of input.
///
/// One connection is open at a time. Engine failures are reported to the
/// caller as error responses; only transport failures end the loop early.
pub fn serve<E, R, W>(engine: &E, reader: &mut R, writer: &mut W) -> Result<(), EngineError>
where
    E: Engine + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut connection: Option<Box<dyn Connection>> = None;

    loop {
        let request: Request = match read_message(reader) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("input closed, host exiting");
                return Ok(());
            }
            Err(dbmig_proto::Error::Io(e)) => return Err(e.into()),
            Err(e) => {
                write_message(writer, &Response::error(e.to_string()))?;
                continue;
            }
        };

        debug!(op = request.op(), "request");
        let mut stop = false;
        let response = match request {
            Request::Hello { protocol_version } => {
                if is_version_compatible(protocol_version, dbmig_proto::PROTOCOL_VERSION) {
                    Response::hello(engine.build_id())
                } else {
                    Response::error(format!(
                        "protocol version {} is not supported, host speaks {}",
                        protocol_version,
                        dbmig_proto::PROTOCOL_VERSION
                    ))
                }
            }
            Request::Connect { url, properties } => {
                if connection.is_some() {
                    Response::error("a connection is already open")
                } else {
                    match engine.connect(&url, &ConnectionProperties::from(properties)) {
                        Ok(conn) => {
                            connection = Some(conn);
                            Response::ok()
                        }
                        Err(e) => Response::error(e.to_string()),
                    }
                }
            }
            Request::Execute { sql } => match connection.as_mut() {
                Some(conn) => match conn.execute(&sql) {
                    Ok(count) => Response::updated(count),
                    Err(e) => Response::error(e.to_string()),
                },
                None => Response::error(EngineError::NotConnected.to_string()),
            },
            Request::Close => {
                connection = None;
                Response::ok()
            }
            Request::Shutdown => {
                connection = None;
                stop = true;
                Response::ok()
            }
        };

        write_message(writer, &response)?;
        if stop {
            debug!("shutdown requested, host exiting");
            return Ok(());
        }
    }
}
