use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aurora_core::env::bridge::{decode_message, encode_message};
use aurora_core::env::messages::{
    DataContainer, EnvActMsg, EnvStateMsg, SimInitAck, SimInitMsg, SpaceDescription,
};
use aurora_core::env::{Dtype, Environment, Ns3Env, Ns3EnvConfig, Space};
use aurora_core::utils::Interrupt;
use aurora_core::AuroraError;
use prost::Message;
use tokio::runtime::Runtime;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn init_msg() -> SimInitMsg {
    SimInitMsg {
        sim_process_id: 42,
        waf_shell_process_id: 41,
        act_space: Some(SpaceDescription::from_space(&Space::uniform_box(
            -1e12,
            1e12,
            vec![1],
            Dtype::Float32,
        ))),
        obs_space: Some(SpaceDescription::from_space(&Space::uniform_box(
            -1e12,
            1e12,
            vec![2],
            Dtype::Float32,
        ))),
    }
}

fn state(obs: &[f32], reward: f32, game_over: bool) -> EnvStateMsg {
    EnvStateMsg {
        obs_data: Some(DataContainer::float_box(obs)),
        reward,
        is_game_over: game_over,
        ..Default::default()
    }
}

/// The gym interface connects right after start-up, possibly before the
/// training side has bound its socket.
async fn connect_req(port: u16) -> ReqSocket {
    let endpoint = format!("tcp://127.0.0.1:{}", port);
    for _ in 0..250 {
        let mut socket = ReqSocket::new();
        if socket.connect(&endpoint).await.is_ok() {
            return socket;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing listening on {}", endpoint);
}

async fn request<Req: Message, Rep: Message + Default>(socket: &mut ReqSocket, msg: &Req) -> Rep {
    socket.send(encode_message(msg)).await.unwrap();
    decode_message(&socket.recv().await.unwrap()).unwrap()
}

#[derive(Debug, Default)]
struct Session {
    actions: Vec<Vec<f32>>,
    stopped: bool,
}

/// One simulator run: init, first state `[index, 0]`, then an episode of
/// `episode_len` steps answered until the stop request.
async fn serve_episode(socket: &mut ReqSocket, index: usize, episode_len: usize) -> Session {
    let ack: SimInitAck = request(socket, &init_msg()).await;
    assert!(ack.done);
    let mut session = Session::default();
    let mut act: EnvActMsg = request(socket, &state(&[index as f32, 0.0], 0.0, false)).await;
    loop {
        if act.stop_sim_req {
            session.stopped = true;
            return session;
        }
        session.actions.push(act.act_data.unwrap().to_f32_vec().unwrap());
        let step = session.actions.len();
        let next = state(&[index as f32, step as f32], 1.0, step >= episode_len);
        act = request(socket, &next).await;
    }
}

/// Runs `episodes` simulator runs in turn; `port_of(i)` tells run `i` where
/// to connect.
fn fake_simulator<F>(mut port_of: F, episodes: usize, episode_len: usize) -> JoinHandle<Vec<Session>>
where
    F: FnMut(usize) -> u16 + Send + 'static,
{
    thread::spawn(move || {
        let rt = runtime();
        let mut sessions = Vec::new();
        for i in 0..episodes {
            let port = port_of(i);
            let session = rt.block_on(async {
                let mut socket = connect_req(port).await;
                let session = serve_episode(&mut socket, i, episode_len).await;
                socket.close().await;
                session
            });
            sessions.push(session);
        }
        sessions
    })
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn connect_config(port: u16) -> Ns3EnvConfig {
    Ns3EnvConfig {
        port,
        start_sim: false,
        ..Ns3EnvConfig::default()
    }
}

#[test]
fn test_episode_over_bridge() {
    let port = free_port();
    let sim = fake_simulator(move |_| port, 1, 3);

    let mut env = Ns3Env::connect(connect_config(port), Interrupt::new()).unwrap();
    assert_eq!(env.port(), Some(port));
    assert_eq!(env.observation_space().to_string(), "Box(2,)");
    assert_eq!(env.action_space().to_string(), "Box(1,)");
    assert_eq!(env.action_space().dtype().to_string(), "float32");

    // The first reset returns the handshake observation without a restart.
    assert_eq!(env.reset().unwrap(), vec![0.0, 0.0]);

    let mut total = 0.0;
    let mut steps = 0;
    loop {
        let step = env.step(&[0.5]).unwrap();
        total += step.reward;
        steps += 1;
        if step.done {
            assert_eq!(step.observation, vec![0.0, 3.0]);
            break;
        }
    }
    assert_eq!(steps, 3);
    assert_eq!(total, 3.0);
    assert!(matches!(env.step(&[0.5]), Err(AuroraError::EpisodeFinished)));

    env.close().unwrap();
    env.close().unwrap();

    let sessions = sim.join().unwrap();
    assert_eq!(sessions[0].actions, vec![vec![0.5]; 3]);
    assert!(sessions[0].stopped);
}

#[test]
fn test_reset_after_steps_restarts_on_same_port() {
    let port = free_port();
    let sim = fake_simulator(move |_| port, 2, 2);

    let mut env = Ns3Env::connect(connect_config(port), Interrupt::new()).unwrap();
    assert_eq!(env.reset().unwrap(), vec![0.0, 0.0]);
    assert!(!env.step(&[0.1]).unwrap().done);

    assert_eq!(env.reset().unwrap(), vec![1.0, 0.0]);
    env.step(&[0.2]).unwrap();
    drop(env);

    let sessions = sim.join().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s.stopped));
    assert_eq!(sessions[0].actions, vec![vec![0.1]]);
    assert_eq!(sessions[1].actions, vec![vec![0.2]]);
}

#[test]
fn test_wrong_action_size_is_rejected() {
    let port = free_port();
    let sim = fake_simulator(move |_| port, 1, 2);
    let mut env = Ns3Env::connect(connect_config(port), Interrupt::new()).unwrap();
    assert!(matches!(env.step(&[0.1, 0.2]), Err(AuroraError::Protocol(_))));
    env.close().unwrap();
    let sessions = sim.join().unwrap();
    assert!(sessions[0].stopped);
    assert!(sessions[0].actions.is_empty());
}

#[test]
fn test_interrupt_unblocks_pending_handshake() {
    let port = free_port();
    let sim = thread::spawn(move || {
        runtime().block_on(async {
            let mut socket = connect_req(port).await;
            let _ack: SimInitAck = request(&mut socket, &init_msg()).await;
            // Never send the first state; keep the socket open.
            tokio::time::sleep(Duration::from_secs(2)).await;
        })
    });

    let interrupt = Interrupt::new();
    let trigger = interrupt.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        trigger.trigger();
    });

    let err = Ns3Env::connect(connect_config(port), interrupt).err().unwrap();
    assert!(err.is_interrupted());
    sim.join().unwrap();
}

#[test]
fn test_undecodable_init_is_decode_error() {
    let port = free_port();
    let sim = thread::spawn(move || {
        runtime().block_on(async {
            let mut socket = connect_req(port).await;
            socket.send(ZmqMessage::from(vec![0xffu8; 3])).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
        })
    });

    let err = Ns3Env::connect(connect_config(port), Interrupt::new()).err().unwrap();
    assert!(matches!(err, AuroraError::Decode(_)));
    sim.join().unwrap();
}

#[test]
fn test_missing_simulator_program_fails_to_launch() {
    let config = Ns3EnvConfig {
        port: 0,
        sim_program: PathBuf::from("/nonexistent/ns3"),
        ..Ns3EnvConfig::default()
    };
    match Ns3Env::connect(config, Interrupt::new()) {
        Err(AuroraError::Simulator(msg)) => assert!(msg.contains("failed to launch"), "{}", msg),
        other => panic!("expected a launch failure, got {:?}", other.err()),
    }
}

#[cfg(unix)]
mod launched {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::process::Command;

    /// Writes an executable stand-in for `./ns3`. It is invoked as
    /// `<script> run "<scenario args>"`.
    fn write_script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ns3");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn launch_config(program: PathBuf) -> Ns3EnvConfig {
        Ns3EnvConfig {
            port: 0,
            start_sim: true,
            sim_program: program,
            ..Ns3EnvConfig::default()
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Waits for the `index`-th launch and returns the port it was given.
    fn launched_port(log: &Path, index: usize) -> u16 {
        for _ in 0..500 {
            if let Some(line) = read_lines(log).get(index) {
                return line
                    .split_whitespace()
                    .find_map(|arg| arg.strip_prefix("--openGymPort="))
                    .unwrap()
                    .parse()
                    .unwrap();
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("simulator launch {} never happened", index);
    }

    fn is_alive(pid: &str) -> bool {
        Command::new("kill")
            .args(["-0", pid])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_launched_simulator_is_relaunched_on_reset() {
        let dir = tempfile::tempdir().unwrap();
        let launches = dir.path().join("launches.log");
        let pids = dir.path().join("pids.log");
        // Ignores the stop request, so every stop ends in a kill.
        let program = write_script(
            dir.path(),
            &format!(
                "echo \"$2\" >> {}\necho $$ >> {}\nexec sleep 30",
                launches.display(),
                pids.display()
            ),
        );

        let log = launches.clone();
        let sim = fake_simulator(move |i| launched_port(&log, i), 2, 5);

        let mut env = Ns3Env::connect(launch_config(program), Interrupt::new()).unwrap();
        let port = env.port().unwrap();
        assert_ne!(port, 0);
        assert_eq!(env.reset().unwrap(), vec![0.0, 0.0]);
        env.step(&[0.3]).unwrap();

        assert_eq!(env.reset().unwrap(), vec![1.0, 0.0]);
        assert_eq!(env.port(), Some(port));
        env.step(&[0.4]).unwrap();
        env.close().unwrap();

        let sessions = sim.join().unwrap();
        assert!(sessions.iter().all(|s| s.stopped));
        assert_eq!(sessions[1].actions, vec![vec![0.4]]);

        let lines = read_lines(&launches);
        assert_eq!(lines.len(), 2);
        for line in &lines {
            assert!(line.starts_with("tcp-pcc-aurora --openGymPort="), "{}", line);
            assert!(line.contains(&format!("--openGymPort={}", port)), "{}", line);
            assert!(line.contains("--simSeed=12"), "{}", line);
        }
        for pid in read_lines(&pids) {
            assert!(!is_alive(&pid), "simulator {} outlived the session", pid);
        }
    }

    #[test]
    fn test_simulator_exiting_before_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let program = write_script(dir.path(), "exit 3");
        match Ns3Env::connect(launch_config(program), Interrupt::new()) {
            Err(AuroraError::Simulator(msg)) => {
                assert!(msg.contains("exited before the handshake"), "{}", msg)
            }
            other => panic!("expected a simulator error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_simulator_exiting_mid_episode() {
        let dir = tempfile::tempdir().unwrap();
        let launches = dir.path().join("launches.log");
        let exit_flag = dir.path().join("exit-now");
        let program = write_script(
            dir.path(),
            &format!(
                "echo \"$2\" >> {}\nwhile [ ! -f {} ]; do sleep 0.05; done\nexit 0",
                launches.display(),
                exit_flag.display()
            ),
        );

        let log = launches.clone();
        let flag = exit_flag.clone();
        let sim = thread::spawn(move || {
            let port = launched_port(&log, 0);
            runtime().block_on(async {
                let mut socket = connect_req(port).await;
                let _ack: SimInitAck = request(&mut socket, &init_msg()).await;
                socket.send(encode_message(&state(&[0.0, 0.0], 0.0, false))).await.unwrap();
                let act: EnvActMsg = decode_message(&socket.recv().await.unwrap()).unwrap();
                assert!(!act.stop_sim_req);
                // Take the action, then let the process die without answering.
                fs::write(&flag, b"").unwrap();
                tokio::time::sleep(Duration::from_millis(500)).await;
            })
        });

        let mut env = Ns3Env::connect(launch_config(program), Interrupt::new()).unwrap();
        match env.step(&[0.5]) {
            Err(AuroraError::Simulator(msg)) => {
                assert!(msg.contains("exited during the episode"), "{}", msg)
            }
            other => panic!("expected a simulator error, got {:?}", other),
        }
        env.close().unwrap();
        sim.join().unwrap();
    }
}
