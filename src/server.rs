//! Connection server: accepts TCP clients and drives each through the
//! receive/dispatch/send state machine over a shared `mio` readiness poller.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token};

use crate::buffer_pool::BufferPool;
use crate::error::{Error, Result};
use crate::protocol::CommandHandler;
use crate::session::{ClientSession, ConnState};
use crate::topic::TopicRegistry;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const EVENTS_CAPACITY: usize = 256;

/// Accepts connections and fans out their I/O readiness events across a small worker pool.
pub struct ConnectionServer {
    shutdown: Arc<AtomicBool>,
    sessions: Arc<Mutex<HashMap<Token, Arc<Mutex<ClientSession>>>>>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    bind_addr: SocketAddr,
}

impl ConnectionServer {
    /// Binds `bind_addr`, starting a dedicated accept thread and `workers` poller threads.
    pub fn start(
        bind_addr: SocketAddr,
        workers: usize,
        handler: Arc<CommandHandler>,
        buffer_pool: Arc<BufferPool>,
    ) -> Result<Arc<Self>> {
        let listener = StdTcpListener::bind(bind_addr)?;
        let bound_addr = listener.local_addr()?;
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let poll = Arc::new(Mutex::new(poll));
        let sessions: Arc<Mutex<HashMap<Token, Arc<Mutex<ClientSession>>>>> = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let next_token = Arc::new(AtomicUsize::new(1));

        let server = Arc::new(Self {
            shutdown: shutdown.clone(),
            sessions: sessions.clone(),
            accept_handle: Mutex::new(None),
            worker_handles: Mutex::new(Vec::new()),
            bind_addr: bound_addr,
        });

        let accept_handle = spawn_accept_thread(
            listener,
            registry.try_clone()?,
            sessions.clone(),
            buffer_pool.clone(),
            shutdown.clone(),
            next_token,
        );
        *server.accept_handle.lock().expect("accept handle lock poisoned") = Some(accept_handle);

        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            handles.push(spawn_worker_thread(
                worker_id,
                poll.clone(),
                registry.try_clone()?,
                sessions.clone(),
                handler.clone(),
                buffer_pool.clone(),
                shutdown.clone(),
            ));
        }
        *server.worker_handles.lock().expect("worker handles lock poisoned") = handles;

        Ok(server)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Stops accepting new connections and lets workers drain, joining every thread.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        // Unblock the accept thread's blocking `accept()` call with a throwaway connection.
        let _ = StdTcpStream::connect(self.bind_addr);

        if let Some(handle) = self.accept_handle.lock().expect("accept handle lock poisoned").take() {
            let _ = handle.join();
        }
        for handle in self.worker_handles.lock().expect("worker handles lock poisoned").drain(..) {
            let _ = handle.join();
        }
        let sessions = self.sessions.lock().expect("sessions lock poisoned");
        log::info!("connection server stopped with {} sessions outstanding", sessions.len());
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_accept_thread(
    listener: StdTcpListener,
    registry: Registry,
    sessions: Arc<Mutex<HashMap<Token, Arc<Mutex<ClientSession>>>>>,
    buffer_pool: Arc<BufferPool>,
    shutdown: Arc<AtomicBool>,
    next_token: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            match listener.accept() {
                Ok((std_stream, peer_addr)) => {
                    // The shutdown throwaway connection used to unblock this accept() call lands
                    // here too; the flag is already set by the time it arrives.
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Err(err) = register_new_connection(
                        std_stream,
                        &registry,
                        &sessions,
                        &buffer_pool,
                        &next_token,
                    ) {
                        log::error!("failed to register connection from {peer_addr}: {err}");
                    }
                }
                Err(err) => {
                    log::error!("accept failed: {err}");
                }
            }
        }
    })
}

fn register_new_connection(
    std_stream: StdTcpStream,
    registry: &Registry,
    sessions: &Arc<Mutex<HashMap<Token, Arc<Mutex<ClientSession>>>>>,
    buffer_pool: &Arc<BufferPool>,
    next_token: &Arc<AtomicUsize>,
) -> Result<()> {
    std_stream.set_nonblocking(true)?;
    let mut stream = TcpStream::from_std(std_stream);
    let token = Token(next_token.fetch_add(1, Ordering::Relaxed));
    registry.register(&mut stream, token, Interest::READABLE)?;

    let buffer = buffer_pool.acquire();
    let session = ClientSession::new(token, stream, buffer);
    let mut sessions = sessions.lock().map_err(|_| Error::Corrupt("sessions lock poisoned"))?;
    sessions.insert(token, Arc::new(Mutex::new(session)));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker_thread(
    worker_id: usize,
    poll: Arc<Mutex<Poll>>,
    registry: Registry,
    sessions: Arc<Mutex<HashMap<Token, Arc<Mutex<ClientSession>>>>>,
    handler: Arc<CommandHandler>,
    buffer_pool: Arc<BufferPool>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            let poll_result = {
                let mut poll = poll.lock().expect("poll lock poisoned");
                poll.poll(&mut events, Some(POLL_TIMEOUT))
            };
            if let Err(err) = poll_result {
                if err.kind() != io::ErrorKind::Interrupted {
                    log::error!("worker {worker_id} poll failed: {err}");
                }
                continue;
            }

            for event in events.iter() {
                let token = event.token();
                let session = {
                    let sessions = sessions.lock().expect("sessions lock poisoned");
                    sessions.get(&token).cloned()
                };
                let Some(session) = session else { continue };
                let mut session = session.lock().expect("session lock poisoned");
                drive_session(&mut session, &event, &registry, &handler);

                if matches!(session.state, ConnState::Closed) {
                    let _ = registry.deregister(&mut session.stream);
                    let buffer = std::mem::take(&mut session.buffer);
                    buffer_pool.release(buffer);
                    drop(session);
                    sessions.lock().expect("sessions lock poisoned").remove(&token);
                }
            }
        }
    })
}

fn drive_session(
    session: &mut ClientSession,
    event: &mio::event::Event,
    registry: &Registry,
    handler: &CommandHandler,
) {
    loop {
        match &session.state {
            ConnState::Receiving => {
                if !event.is_readable() {
                    return;
                }
                let mut buf = vec![0u8; session.buffer.len()];
                match session.stream.read(&mut buf) {
                    Ok(0) => {
                        session.state = ConnState::Closed;
                    }
                    Ok(n) => {
                        let lines = session.drain_complete_lines(&buf[..n]);
                        let mut reply = Vec::new();
                        for line in &lines {
                            reply.extend_from_slice(handler.handle(line, &mut session.subscribed_topics).as_bytes());
                        }
                        if reply.is_empty() {
                            return;
                        }
                        session.state = ConnState::Sending {
                            pending: reply,
                            written: 0,
                        };
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                    Err(_) => {
                        session.state = ConnState::Closed;
                    }
                }
            }
            ConnState::Sending { .. } => {
                let ConnState::Sending { pending, written } = &mut session.state else {
                    unreachable!()
                };
                match session.stream.write(&pending[*written..]) {
                    Ok(0) => {
                        session.state = ConnState::Closed;
                    }
                    Ok(n) => {
                        *written += n;
                        if *written == pending.len() {
                            session.state = ConnState::Receiving;
                            let _ = registry.reregister(&mut session.stream, session.token, Interest::READABLE);
                        } else {
                            let _ = registry.reregister(&mut session.stream, session.token, Interest::WRITABLE);
                            return;
                        }
                    }
                    Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                        let _ = registry.reregister(&mut session.stream, session.token, Interest::WRITABLE);
                        return;
                    }
                    Err(_) => {
                        session.state = ConnState::Closed;
                    }
                }
            }
            ConnState::Closed => return,
        }
    }
}
