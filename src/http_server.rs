//! HTTP server for the alarm page.
//!
//! [`HttpConnection`] holds the state of one accepted connection and turns stack events
//! (data received, data acknowledged, idle poll, error, remote close) into a [`Step`]; it does
//! no I/O itself. [`HttpServer`] hands connections out and takes them back in
//! [`HttpServer::close_client`], the one place a connection ends.
//!
//! Only `GET /` (optionally `?alarm=on` / `?alarm=off`) renders the page. Any other path gets
//! a 302 back to `/`. Every response carries `Connection: close`.

#![allow(clippy::future_not_send, reason = "single-threaded")]

use core::fmt::Write;
use core::net::Ipv4Addr;

use heapless::String;
use portable_atomic::{AtomicUsize, Ordering};

use crate::alarm::AlarmSwitch;
use crate::ap_config::ApIdentity;
use crate::page::{self, PageBody};
use crate::shared_constants::HTTP_BACKLOG;
use crate::{Error, Result};

/// Bytes of the first segment examined for the request line.
pub const REQUEST_MAX_LEN: usize = 127;
pub const HEADER_MAX_LEN: usize = 127;

pub type HeaderBuffer = String<HEADER_MAX_LEN>;

/// Why a connection ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CloseReason {
    /// The peer acknowledged the whole response.
    Complete,
    RemoteClosed,
    /// The idle poll fired.
    Idle,
    /// A read, a write or the connection itself failed.
    StackError,
    /// The response did not fit its buffers; nothing was sent.
    Overflow,
}

/// What the caller must do next with a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Keep the connection and wait for the next event.
    Wait,
    /// Write [`HttpConnection::response`], headers then body.
    Respond,
    /// Hand the connection to [`HttpServer::close_client`].
    Close(CloseReason),
}

/// Path and query of a `GET` request line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestTarget<'a> {
    pub path: &'a str,
    /// Everything after the first `?`; empty when there is none.
    pub query: &'a str,
}

/// Parses the request line of a `GET` from the first [`REQUEST_MAX_LEN`] bytes of `request`.
///
/// Returns `None` for any other method or a target that is not UTF-8.
#[must_use]
pub fn parse_request(request: &[u8]) -> Option<RequestTarget<'_>> {
    let scratch = request.get(..REQUEST_MAX_LEN).unwrap_or(request);
    let rest = scratch.strip_prefix(b"GET ")?.trim_ascii_start();
    let target = rest
        .split(u8::is_ascii_whitespace)
        .next()
        .unwrap_or_default();
    let target = core::str::from_utf8(target).ok()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    Some(RequestTarget { path, query })
}

/// A complete response: headers and body, written back to back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    headers: HeaderBuffer,
    body: PageBody,
}

impl Response {
    fn page(body: PageBody) -> Result<Self> {
        let mut headers = HeaderBuffer::new();
        write!(
            headers,
            "HTTP/1.1 200 OK\r\n\
Content-Length: {}\r\n\
Content-Type: text/html; charset=utf-8\r\n\
Connection: close\r\n\r\n",
            body.len()
        )
        .map_err(|_| Error::HeadersOverflow)?;
        Ok(Self { headers, body })
    }

    fn redirect(gateway: Ipv4Addr) -> Result<Self> {
        let mut headers = HeaderBuffer::new();
        write!(
            headers,
            "HTTP/1.1 302 Redirect\r\nLocation: http://{gateway}/\r\n\r\n"
        )
        .map_err(|_| Error::HeadersOverflow)?;
        Ok(Self {
            headers,
            body: PageBody::new(),
        })
    }

    #[must_use]
    pub fn headers(&self) -> &[u8] {
        self.headers.as_bytes()
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        self.body.as_bytes()
    }

    #[must_use]
    pub fn total_len(&self) -> usize {
        self.headers.len().saturating_add(self.body.len())
    }
}

/// Shared context of all connections: the network identity for redirects, the alarm switch
/// the page writes to, and the count of open connections.
pub struct HttpServer<'a> {
    identity: ApIdentity,
    alarm: &'a AlarmSwitch,
    open: AtomicUsize,
}

impl<'a> HttpServer<'a> {
    #[must_use]
    pub const fn new(identity: ApIdentity, alarm: &'a AlarmSwitch) -> Self {
        Self {
            identity,
            alarm,
            open: AtomicUsize::new(0),
        }
    }

    /// Allocates the state for a newly accepted connection.
    ///
    /// # Errors
    ///
    /// [`Error::NoFreeConnection`] when [`HTTP_BACKLOG`] connections are already open.
    pub fn accept(&self) -> Result<HttpConnection<'_>> {
        self.open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < HTTP_BACKLOG).then_some(open.saturating_add(1))
            })
            .map_err(|_| Error::NoFreeConnection)?;
        Ok(HttpConnection {
            server: self,
            response: None,
            sent_ack: 0,
        })
    }

    /// Ends `connection` and releases its state.
    pub fn close_client(&self, connection: HttpConnection<'_>, _reason: CloseReason) {
        #[cfg(feature = "defmt")]
        defmt::debug!(
            "HTTP connection closed ({}) after {} bytes acknowledged",
            _reason,
            connection.sent_ack
        );
        drop(connection);
    }

    /// Number of connections accepted and not yet released.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    fn release(&self) {
        let released = self
            .open
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                open.checked_sub(1)
            });
        debug_assert!(released.is_ok(), "connection released twice");
    }
}

/// State of one accepted connection.
///
/// The state is released exactly once: when it is passed to [`HttpServer::close_client`], or
/// when it is dropped because its task was cancelled.
pub struct HttpConnection<'s> {
    server: &'s HttpServer<'s>,
    response: Option<Response>,
    sent_ack: usize,
}

impl HttpConnection<'_> {
    /// Data arrived. An empty segment means the peer closed its side.
    ///
    /// Only the first `GET` is answered; anything that is not a `GET` is ignored and the
    /// connection waits, and data arriving after the response is discarded.
    pub fn on_recv(&mut self, bytes: &[u8]) -> Step {
        if bytes.is_empty() {
            return self.on_remote_close();
        }
        if self.response.is_some() {
            return Step::Wait;
        }
        let Some(target) = parse_request(bytes) else {
            #[cfg(feature = "defmt")]
            defmt::debug!("HTTP request ignored: not a GET");
            return Step::Wait;
        };
        #[cfg(feature = "defmt")]
        defmt::info!("HTTP GET {} ?{}", target.path, target.query);

        match self.respond_to(target) {
            Ok(response) => {
                self.response = Some(response);
                self.sent_ack = 0;
                Step::Respond
            }
            Err(_err) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("HTTP response dropped: {}", defmt::Display2Format(&_err));
                Step::Close(CloseReason::Overflow)
            }
        }
    }

    fn respond_to(&self, target: RequestTarget<'_>) -> Result<Response> {
        if target.path != "/" {
            return Response::redirect(self.server.identity.gateway());
        }
        let alarm = self.server.alarm;
        let rendered = page::render(target.query, alarm.is_active())?;
        let alarm_active = rendered.alarm_active;
        let response = Response::page(rendered.body)?;
        alarm.set(alarm_active);
        Ok(response)
    }

    /// The peer acknowledged `len` more bytes.
    pub fn on_sent(&mut self, len: usize) -> Step {
        self.sent_ack = self.sent_ack.saturating_add(len);
        match &self.response {
            Some(response) if self.sent_ack >= response.total_len() => {
                Step::Close(CloseReason::Complete)
            }
            _ => Step::Wait,
        }
    }

    /// The idle poll fired: close now.
    #[must_use]
    pub const fn on_poll(&self) -> Step {
        Step::Close(CloseReason::Idle)
    }

    #[must_use]
    pub const fn on_error(&self) -> Step {
        Step::Close(CloseReason::StackError)
    }

    #[must_use]
    pub const fn on_remote_close(&self) -> Step {
        Step::Close(CloseReason::RemoteClosed)
    }

    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    #[must_use]
    pub const fn sent_ack(&self) -> usize {
        self.sent_ack
    }
}

impl Drop for HttpConnection<'_> {
    fn drop(&mut self) {
        self.server.release();
    }
}

#[cfg(all(feature = "wifi", not(feature = "host")))]
pub use task::http_server_task;

#[cfg(all(feature = "wifi", not(feature = "host")))]
mod task {
    use defmt::{debug, info, warn};
    use embassy_futures::join::join_array;
    use embassy_futures::select::select;
    use embassy_net::Stack;
    use embassy_net::tcp::{self, TcpSocket};
    use embassy_time::{Timer, with_timeout};
    use embedded_io_async::Write as _;

    use super::{CloseReason, HttpConnection, HttpServer, REQUEST_MAX_LEN, Step};
    use crate::service::ServiceLink;
    use crate::shared_constants::{HTTP_BACKLOG, HTTP_IDLE_TIMEOUT, HTTP_PORT};

    /// Listens on TCP/80 with [`HTTP_BACKLOG`] concurrent connections until `link` asks it to
    /// stop. Stopping drops every socket, which aborts connections still open.
    #[embassy_executor::task]
    pub async fn http_server_task(
        stack: Stack<'static>,
        server: &'static HttpServer<'static>,
        link: &'static ServiceLink,
    ) {
        link.report_started(Ok(()));
        info!("HTTP server listening on port {}", HTTP_PORT);

        let listeners: [_; HTTP_BACKLOG] =
            core::array::from_fn(|index| listen(stack, server, index));
        select(join_array(listeners), link.stop_requested()).await;

        info!("HTTP server stopped");
        link.report_stopped();
    }

    async fn listen(stack: Stack<'static>, server: &'static HttpServer<'static>, index: usize) {
        let mut rx_buffer = [0u8; 1024];
        let mut tx_buffer = [0u8; 2048];

        loop {
            let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
            socket.set_timeout(Some(HTTP_IDLE_TIMEOUT));

            if let Err(err) = socket.accept(HTTP_PORT).await {
                warn!("HTTP accept error on listener {}: {:?}", index, err);
                Timer::after_millis(100).await;
                continue;
            }

            let mut connection = match server.accept() {
                Ok(connection) => connection,
                Err(err) => {
                    warn!("HTTP connection refused: {}", defmt::Display2Format(&err));
                    socket.abort();
                    let _ = socket.flush().await;
                    continue;
                }
            };

            let reason = drive(&mut socket, &mut connection).await;
            server.close_client(connection, reason);
            if reason == CloseReason::Complete {
                socket.close();
            } else {
                socket.abort();
            }
            let _ = socket.flush().await;
        }
    }

    /// Feeds socket events to `connection` until it asks to be closed.
    async fn drive(socket: &mut TcpSocket<'_>, connection: &mut HttpConnection<'_>) -> CloseReason {
        let mut request = [0u8; REQUEST_MAX_LEN];
        loop {
            let step = match with_timeout(HTTP_IDLE_TIMEOUT, socket.read(&mut request)).await {
                Err(_) => connection.on_poll(),
                Ok(Ok(len)) => connection.on_recv(request.get(..len).unwrap_or_default()),
                Ok(Err(err)) => {
                    debug!("HTTP read error: {:?}", err);
                    connection.on_error()
                }
            };

            let step = match step {
                Step::Respond => match write_response(socket, connection).await {
                    Ok(acknowledged) => connection.on_sent(acknowledged),
                    Err(err) => {
                        warn!("HTTP write error: {:?}", err);
                        connection.on_error()
                    }
                },
                other => other,
            };

            if let Step::Close(reason) = step {
                return reason;
            }
        }
    }

    /// Writes headers then body and waits until the peer has acknowledged all of it.
    async fn write_response(
        socket: &mut TcpSocket<'_>,
        connection: &HttpConnection<'_>,
    ) -> Result<usize, tcp::Error> {
        let Some(response) = connection.response() else {
            return Ok(0);
        };
        socket.write_all(response.headers()).await?;
        socket.write_all(response.body()).await?;
        socket.flush().await?;
        Ok(response.total_len())
    }
}
