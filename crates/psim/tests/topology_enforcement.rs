//! Topology enforcement across whole simulations.

use psim::{PsimError, SimConfig, Simulation, Topology, TopologyKind};
use test_case::test_case;

fn run_with(processes: usize, kind: TopologyKind) -> Simulation {
    Simulation::new(
        SimConfig::default()
            .with_processes(processes)
            .with_topology(kind),
    )
}

#[test]
fn point_to_point_roundtrip_is_unmodified() {
    let observed = run_with(2, TopologyKind::FullyConnected)
        .run(|rank, comm| {
            if rank == 0 {
                comm.send(0, 1, vec![1.5_f64, -2.25, 1e9])?;
                Ok::<_, PsimError>(None)
            } else {
                comm.receive(1, 0).map(Some)
            }
        })
        .unwrap();

    assert_eq!(observed[0].as_ref().unwrap(), &None);
    assert_eq!(
        observed[1].as_ref().unwrap(),
        &Some(vec![1.5_f64, -2.25, 1e9])
    );
}

#[test]
fn neighbours_talk_along_a_one_dimensional_mesh() {
    // Pass a token down the line 0 -> 1 -> 2 -> 3, adding one per hop.
    let observed = run_with(4, TopologyKind::Mesh1D)
        .run(|rank, comm| {
            let token = if rank == 0 {
                0
            } else {
                comm.receive(rank, rank - 1)? + 1
            };
            if rank + 1 < comm.processes() {
                comm.send(rank, rank + 1, token)?;
            }
            Ok::<_, PsimError>(token)
        })
        .unwrap();

    let tokens: Vec<u32> = observed.into_iter().map(Result::unwrap).collect();
    assert_eq!(tokens, vec![0, 1, 2, 3]);
}

#[test]
fn token_ring_wraps_on_a_torus() {
    let processes = 5;
    let observed = run_with(processes, TopologyKind::Torus1D)
        .run(|rank, comm| {
            let next = (rank + 1) % processes;
            let prev = (rank + processes - 1) % processes;
            if rank == 0 {
                comm.send(0, next, 1)?;
                comm.receive(0, prev)
            } else {
                let token = comm.receive(rank, prev)?;
                comm.send(rank, next, token * 2)?;
                Ok(token)
            }
        })
        .unwrap();

    let tokens: Vec<u64> = observed.into_iter().map(Result::unwrap).collect();
    assert_eq!(tokens, vec![16, 1, 2, 4, 8]);
}

#[test]
fn non_adjacent_send_is_rejected_without_blocking() {
    let observed = run_with(3, TopologyKind::Mesh1D)
        .run(|rank, comm| match rank {
            0 => comm.send(0, 2, 99),
            2 => comm.receive(2, 0).map(|_| ()),
            _ => Ok(()),
        })
        .unwrap();

    assert!(observed[1].is_ok());
    for rank in [0, 2] {
        assert!(matches!(
            observed[rank],
            Err(PsimError::TopologyViolation { from: 0, to: 2 })
        ));
    }
}

#[test]
fn out_of_range_rank_is_reported() {
    let observed = run_with(2, TopologyKind::FullyConnected)
        .run(|rank, comm| comm.send(rank, 2, 0_u8))
        .unwrap();

    for result in observed {
        assert!(matches!(
            result,
            Err(PsimError::RankOutOfRange {
                rank: 2,
                processes: 2
            })
        ));
    }
}

#[test_case(TopologyKind::Mesh1D, 3, 0; "mesh1d from end")]
#[test_case(TopologyKind::Tree, 3, 0; "tree from root")]
#[test_case(TopologyKind::Mesh2D, 4, 0; "mesh2d from corner")]
#[test_case(TopologyKind::Torus2D, 9, 4; "torus2d from centre")]
fn broadcast_fails_on_every_rank_when_root_lacks_links(
    kind: TopologyKind,
    processes: usize,
    root: usize,
) {
    let observed = run_with(processes, kind)
        .run(|rank, comm| comm.one_to_all_broadcast(rank, root, rank))
        .unwrap();

    for result in observed {
        assert!(matches!(result, Err(PsimError::TopologyViolation { .. })));
    }
}

#[test_case(TopologyKind::Mesh1D, 3, 1; "mesh1d from middle")]
#[test_case(TopologyKind::Tree, 4, 1; "tree from inner node")]
#[test_case(TopologyKind::FullyConnected, 6, 5; "fully connected from last")]
#[test_case(TopologyKind::Torus1D, 3, 2; "three ring")]
fn broadcast_succeeds_when_root_reaches_everyone(
    kind: TopologyKind,
    processes: usize,
    root: usize,
) {
    let observed = run_with(processes, kind)
        .run(|rank, comm| comm.one_to_all_broadcast(rank, root, rank * 100))
        .unwrap();

    for result in observed {
        assert_eq!(result.unwrap(), root * 100);
    }
}

#[test]
fn custom_topology_overrides_configured_kind() {
    // Star centred on rank 0 with one-way spokes outwards only.
    let sim =
        run_with(4, TopologyKind::Mesh1D).with_topology(Topology::custom(|from, _| from == 0));

    let observed = sim
        .run(|rank, comm| {
            let broadcast = comm.one_to_all_broadcast(rank, 0, 42_i32);
            let collect = comm.all_to_one_collect(rank, 0, rank as i32);
            (broadcast, collect)
        })
        .unwrap();

    for (broadcast, collect) in observed {
        assert_eq!(broadcast.unwrap(), 42);
        assert!(matches!(
            collect,
            Err(PsimError::TopologyViolation { to: 0, .. })
        ));
    }
}

#[test]
fn zero_processes_is_a_config_error() {
    let err = run_with(0, TopologyKind::FullyConnected)
        .run(|_, _: &psim::Communicator<u8>| ())
        .unwrap_err();
    assert!(matches!(err, PsimError::Config(_)));
}

#[test]
fn panicking_worker_is_reported_after_join() {
    let err = run_with(3, TopologyKind::FullyConnected)
        .run(|rank, _: &psim::Communicator<u8>| {
            assert!(rank != 1, "rank 1 gives up");
            rank
        })
        .unwrap_err();
    assert!(matches!(err, PsimError::WorkerPanicked { rank: 1 }));
}

#[test]
fn panicking_worker_releases_blocked_peers() {
    // Rank 0 waits on rank 1, which panics before sending.
    let err = run_with(2, TopologyKind::FullyConnected)
        .run(|rank, comm: &psim::Communicator<u8>| {
            if rank == 0 {
                return comm.receive(0, 1).map(drop);
            }
            panic!("rank 1 gives up before sending");
        })
        .unwrap_err();
    assert!(matches!(err, PsimError::WorkerPanicked { rank: 1 }));
}
