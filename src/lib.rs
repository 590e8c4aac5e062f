// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(missing_docs, rust_2018_idioms, unused_imports)]
// Several core types (`Notifier`, `Signal`, `Broker`, `ConnectionHandler`, ...)
// hold `mio`/`rustls` handles or `Rc<dyn Fn>` slots that don't implement
// `Debug`; denying `missing_debug_implementations` crate-wide would force
// busywork wrappers around library types for no diagnostic benefit.
#![allow(missing_debug_implementations)]
// Disallow warnings in examples.
#![doc(test(attr(deny(warnings))))]

//! halcyon is a single-threaded-per-worker HTTP/1.1 server core built on
//! edge-triggered epoll readiness.
//!
//! Each [`worker::Worker`] owns one [`notifier::Notifier`] (a thread-local
//! `mio::Poll`), one [`deleter::Deleter`] for safe destruction mid-dispatch,
//! and a [`handler_repository::HandlerRepository`] of per-connection
//! [`connection_handler::ConnectionHandler`]s, each pairing a
//! [`net::tcp_socket::TcpSocket`] with a [`parser::engine::RequestParser`]
//! and a [`broker::Broker`] for composing the response. Requests are routed
//! to application code through a shared, read-only
//! [`router::HttpRequestRouter`]. Nothing here spawns a thread, takes a
//! lock, or allocates across worker boundaries — concurrency, if any, is the
//! caller's: run one `Worker` per thread and hand each an accepted
//! connection.
//!
//! ## Examples
//!
//! Runnable demonstrations live in the `demos` directory of the source
//! repository.

pub mod broker;
pub mod buffer;
pub mod channel;
pub mod connection_handler;
pub mod deleter;
pub mod error;
pub mod handler_repository;
pub mod limits;
pub mod net;
pub mod notifier;
pub mod object;
pub mod parser;
pub mod router;
pub mod simd;
pub mod timer;
pub mod worker;
