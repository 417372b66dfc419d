// Reader slot locks are robust mutexes, owned by the thread that took them.
// A slot taken on a short-lived thread would look abandoned once that thread
// exits, so every reader slot in the process is claimed and released on one
// thread that lives as long as the process.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::OnceLock;
use std::thread;

use parking_lot::Mutex;

use super::reader_info::{ReaderSlotTable, SlotId};
use crate::error::{BusError, Result};

enum Request {
    Alloc(ReaderSlotTable, Sender<Option<SlotId>>),
    Free(ReaderSlotTable, SlotId, Sender<()>),
}

static KEEPER: OnceLock<Mutex<Sender<Request>>> = OnceLock::new();

fn keeper() -> Result<&'static Mutex<Sender<Request>>> {
    if let Some(keeper) = KEEPER.get() {
        return Ok(keeper);
    }
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("dmxp-bus-slots".into())
        .spawn(move || serve(rx))?;
    // a racing caller may win; the losing sender drops and its thread exits
    let _ = KEEPER.set(Mutex::new(tx));
    KEEPER
        .get()
        .ok_or_else(|| BusError::Io(io::Error::other("slot keeper not started")))
}

fn serve(requests: Receiver<Request>) {
    while let Ok(request) = requests.recv() {
        match request {
            Request::Alloc(table, reply) => {
                let _ = reply.send(table.alloc());
            }
            Request::Free(table, id, done) => {
                table.free(id);
                let _ = done.send(());
            }
        }
    }
}

fn keeper_gone() -> BusError {
    BusError::Io(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "slot keeper thread exited",
    ))
}

/// Claim a free slot in `table` for this process. `None` when all are taken.
pub fn alloc(table: &ReaderSlotTable) -> Result<Option<SlotId>> {
    let (reply, rx) = mpsc::channel();
    keeper()?
        .lock()
        .send(Request::Alloc(table.clone(), reply))
        .map_err(|_| keeper_gone())?;
    rx.recv().map_err(|_| keeper_gone())
}

/// Release a slot claimed with [`alloc`]. Callable from any thread.
pub fn free(table: &ReaderSlotTable, id: SlotId) {
    let (done, rx) = mpsc::channel();
    let sent = match keeper() {
        Ok(keeper) => keeper.lock().send(Request::Free(table.clone(), id, done)).is_ok(),
        Err(_) => false,
    };
    if !sent || rx.recv().is_err() {
        tracing::error!(slot = id, "slot keeper unavailable; slot stays claimed");
    }
}
