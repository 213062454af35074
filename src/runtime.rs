// Bus owner task and command loop
// The bus is half-duplex: a single blocking task owns the controller and
// runs commands one after another. Async callers talk to it via BusHandle.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

// local imports
use crate::cli::{Cli, Command};
use crate::messages::{PositionReport, PositionSnapshot};
use crate::motor::{FeetechError, Positions, SerialTransport, ServoBus, ShutdownReport, Transport};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

enum BusCommand {
    ReadAll {
        reply: oneshot::Sender<Result<Positions, FeetechError>>,
    },
    Read {
        id: u8,
        reply: oneshot::Sender<Result<Option<u16>, FeetechError>>,
    },
    Write {
        id: u8,
        position: i32,
        reply: oneshot::Sender<Result<bool, FeetechError>>,
    },
}

/// Cloneable async front for the bus owner task
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusCommand>,
}

impl BusHandle {
    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<R, FeetechError>>) -> BusCommand,
    ) -> Result<R, FeetechError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| FeetechError::OwnerStopped)?;
        rx.await.map_err(|_| FeetechError::OwnerStopped)?
    }

    pub async fn read_all_positions(&self) -> Result<Positions, FeetechError> {
        self.request(|reply| BusCommand::ReadAll { reply }).await
    }

    pub async fn read_motor_position(&self, id: u8) -> Result<Option<u16>, FeetechError> {
        self.request(|reply| BusCommand::Read { id, reply }).await
    }

    pub async fn write_motor_position(&self, id: u8, position: i32) -> Result<bool, FeetechError> {
        self.request(|reply| BusCommand::Write {
            id,
            position,
            reply,
        })
        .await
    }
}

/// Move the controller into a blocking task that serves commands until every
/// handle is dropped, then hands the controller back.
pub fn spawn_bus_owner<T>(bus: ServoBus<T>) -> (BusHandle, JoinHandle<ServoBus<T>>)
where
    T: Transport + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(8);

    let owner = tokio::task::spawn_blocking(move || {
        let mut bus = bus;
        while let Some(cmd) = rx.blocking_recv() {
            // A dropped receiver just means the caller stopped waiting
            match cmd {
                BusCommand::ReadAll { reply } => {
                    let _ = reply.send(bus.read_all_positions());
                }
                BusCommand::Read { id, reply } => {
                    let _ = reply.send(bus.read_motor_position(id));
                }
                BusCommand::Write {
                    id,
                    position,
                    reply,
                } => {
                    let _ = reply.send(bus.write_motor_position(id, position));
                }
            }
        }
        debug!("Bus owner finished");
        bus
    });

    (BusHandle { tx }, owner)
}

/// Wait for the owner to finish, then run the torque-off disconnect
pub async fn shutdown<T>(owner: JoinHandle<ServoBus<T>>) -> Result<ShutdownReport, BoxError>
where
    T: Transport + Send + 'static,
{
    let mut bus = owner.await?;
    let report = tokio::task::spawn_blocking(move || bus.disconnect()).await??;
    Ok(report)
}

/// Sweep the arm at `hz` until `stop` resolves. Returns the number of
/// completed sweeps.
pub async fn monitor(
    handle: &BusHandle,
    hz: u64,
    json: bool,
    stop: impl Future<Output = ()>,
) -> Result<usize, BoxError> {
    let mut tick = interval(Duration::from_millis(1000 / hz.max(1)));
    // A sweep with silent motors can outlast the period
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(stop);

    info!("Monitoring motor positions at {}Hz", hz);
    let mut sweeps = 0;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            positions = async {
                tick.tick().await;
                handle.read_all_positions().await
            } => {
                let snapshot = PositionSnapshot::from(&positions?);
                if snapshot.responding() < snapshot.motors.len() {
                    debug!(
                        "{} of {} motors responded",
                        snapshot.responding(),
                        snapshot.motors.len()
                    );
                }
                print_snapshot(&snapshot, json)?;
                sweeps += 1;
            }
        }
    }

    info!("Monitor stopped after {} sweeps", sweeps);
    Ok(sweeps)
}

fn print_snapshot(snapshot: &PositionSnapshot, json: bool) -> Result<(), BoxError> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
    } else {
        println!("=== Motor Positions ===");
        for motor in &snapshot.motors {
            println!("{}", motor);
        }
        println!("=======================");
    }
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
}

pub async fn run(cli: Cli) -> Result<(), BoxError> {
    let transport = SerialTransport::new(&cli.port);
    info!("Opening servo bus on {}", transport.port_name());

    let mut bus = ServoBus::with_config(transport, cli.bus_config());
    bus.connect(cli.baud)?;

    serve(bus, cli.command).await
}

/// Run one command on a connected bus, then disconnect. The command's own
/// error wins over a shutdown error.
pub async fn serve<T>(bus: ServoBus<T>, command: Command) -> Result<(), BoxError>
where
    T: Transport + Send + 'static,
{
    let (handle, owner) = spawn_bus_owner(bus);
    let result = execute(&handle, command).await;

    // Torque off runs even if the command failed
    drop(handle);
    match (result, shutdown(owner).await) {
        (result, Ok(report)) => {
            if !report.is_clean() {
                warn!("Motors {:?} may still hold torque", report.failed_ids());
            }
            result
        }
        (Err(e), Err(shutdown_err)) => {
            warn!("Shutdown after failed command also failed: {}", shutdown_err);
            Err(e)
        }
        (Ok(()), Err(shutdown_err)) => Err(shutdown_err),
    }
}

async fn execute(handle: &BusHandle, command: Command) -> Result<(), BoxError> {
    match command {
        Command::Positions { json } => {
            let positions = handle.read_all_positions().await?;
            print_snapshot(&PositionSnapshot::from(&positions), json)?;
        }
        Command::Read { id } => {
            let position = handle.read_motor_position(id).await?;
            println!("{}", PositionReport::new(id, position));
        }
        Command::Write { id, position } => {
            if !handle.write_motor_position(id, position).await? {
                return Err(format!("Failed to write position to motor {}", id).into());
            }
            info!("Holding motor {} at {}, press Ctrl+C to release", id, position);
            ctrl_c().await;
        }
        Command::Monitor { hz, json } => {
            monitor(handle, hz, json, ctrl_c()).await?;
        }
    }
    Ok(())
}
