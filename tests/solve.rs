use std::collections::VecDeque;

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use sokosearch::bits::BoxSet;
use sokosearch::board::{Cell, DIRECTIONS};
use sokosearch::deadlock::DeadlockKind;
use sokosearch::heuristic::Heuristic;
use sokosearch::state::{canonical_of, push, StateKey};
use sokosearch::{solve, Board, BoardError, Level, SearchStatus, SolveError, SolverConfig};

const CORRIDOR: &str = "###########\n\
                        #. $ @ $ .#\n\
                        ###########";

const ROOM: &str = "######\n\
                    #    #\n\
                    # $$ #\n\
                    # .. #\n\
                    #  @ #\n\
                    ######";

fn board(text: &str) -> Board {
    Board::new(&Level::parse(text).unwrap()).unwrap()
}

/// Plays LURD text on the raw grid; returns pushes made if every move was
/// legal and the level ends solved.
fn play(text: &str, lurd: &str) -> Option<usize> {
    let mut grid: Vec<Vec<u8>> = text.lines().map(|l| l.as_bytes().to_vec()).collect();
    let mut agent = None;
    for (r, row) in grid.iter_mut().enumerate() {
        for (c, ch) in row.iter_mut().enumerate() {
            match *ch {
                b'@' => {
                    agent = Some((r, c));
                    *ch = b' ';
                }
                b'+' => {
                    agent = Some((r, c));
                    *ch = b'.';
                }
                _ => {}
            }
        }
    }
    let (mut r, mut c) = agent?;
    let mut pushes = 0;
    for m in lurd.chars() {
        let (dr, dc): (isize, isize) = match m.to_ascii_lowercase() {
            'u' => (-1, 0),
            'd' => (1, 0),
            'l' => (0, -1),
            'r' => (0, 1),
            _ => return None,
        };
        let nr = (r as isize + dr) as usize;
        let nc = (c as isize + dc) as usize;
        let at = grid[nr][nc];
        let is_box = at == b'$' || at == b'*';
        if at == b'#' || is_box != m.is_ascii_uppercase() {
            return None;
        }
        if is_box {
            let br = (nr as isize + dr) as usize;
            let bc = (nc as isize + dc) as usize;
            match grid[br][bc] {
                b' ' => grid[br][bc] = b'$',
                b'.' => grid[br][bc] = b'*',
                _ => return None,
            }
            grid[nr][nc] = if at == b'*' { b'.' } else { b' ' };
            pushes += 1;
        }
        r = nr;
        c = nc;
    }
    let solved = grid.iter().flatten().all(|&ch| ch != b'$');
    solved.then_some(pushes)
}

fn successors(b: &Board, key: &StateKey) -> Vec<StateKey> {
    let reach = b.reach(key.agent, &key.boxes);
    let mut out = Vec::new();
    for bx in key.boxes.iter() {
        let bx = bx as Cell;
        for dir in DIRECTIONS {
            let Some(stand) = b.neighbor(bx, dir.reverse()) else {
                continue;
            };
            if !reach.contains(stand as usize) {
                continue;
            }
            if let Some(succ) = push(b, &key.boxes, bx, dir, false) {
                out.push(StateKey::normalized(b, succ.agent, succ.boxes));
            }
        }
    }
    out
}

/// Fewest pushes from `from` to any solved state, by plain breadth-first
/// search with no pruning at all.
fn brute_force(b: &Board, from: StateKey) -> Option<u32> {
    let mut dist: FxHashMap<StateKey, u32> = FxHashMap::default();
    let mut queue = VecDeque::new();
    dist.insert(from, 0);
    queue.push_back(from);
    while let Some(key) = queue.pop_front() {
        let d = dist[&key];
        if key.is_solved(b) {
            return Some(d);
        }
        for next in successors(b, &key) {
            if !dist.contains_key(&next) {
                dist.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }
    None
}

fn all_states(b: &Board) -> Vec<StateKey> {
    let start = StateKey::normalized(b, b.start_agent(), *b.start_boxes());
    let mut seen = vec![start];
    let mut queue = VecDeque::from([start]);
    while let Some(key) = queue.pop_front() {
        for next in successors(b, &key) {
            if !seen.contains(&next) {
                seen.push(next);
                queue.push_back(next);
            }
        }
    }
    seen
}

#[test]
fn two_box_corridor_takes_the_minimal_pushes() {
    let outcome = solve(CORRIDOR, SolverConfig::default()).unwrap();
    assert_eq!(outcome.status, SearchStatus::Solved);
    let solution = outcome.solution.unwrap();
    assert_eq!(solution.pushes, 4);
    assert_eq!(play(CORRIDOR, &solution.lurd()), Some(4));
}

#[test]
fn room_solution_is_optimal_and_replays() {
    let b = board(ROOM);
    let start = StateKey::normalized(&b, b.start_agent(), *b.start_boxes());
    let optimum = brute_force(&b, start).unwrap();

    for tunnel_macros in [true, false] {
        let config = SolverConfig {
            tunnel_macros,
            ..SolverConfig::default()
        };
        let outcome = solve(ROOM, config).unwrap();
        assert_eq!(outcome.status, SearchStatus::Solved);
        let solution = outcome.solution.unwrap();
        assert_eq!(solution.pushes, optimum);
        assert_eq!(play(ROOM, &solution.lurd()), Some(optimum as usize));
        assert_eq!(solution.moves(), solution.lurd().len());
    }
}

#[test]
fn heuristic_never_overestimates() {
    let mut checked = 0;
    for text in [ROOM, CORRIDOR] {
        let b = board(text);
        let mut h = Heuristic::new(1.0);
        for key in all_states(&b) {
            let Some(real) = brute_force(&b, key) else {
                continue;
            };
            let bound = h.lower_bound(&b, &key.boxes).expect("solvable state has a bound");
            assert!(bound <= real, "h = {bound} > {real} for {key:?}");
            checked += 1;
        }
    }
    assert!(checked >= 6);
}

// The box on (1,3) seals (1,1) off in some states, but not once (1,1)
// already holds a box.
const SEALED_GOAL: &str = "#########\n\
                           #. .#####\n\
                           ##  #####\n\
                           # $ #   #\n\
                           ## $#$# #\n\
                           ##. .$ @#\n\
                           #########";

#[test]
fn push_counts_agree_with_brute_force() {
    let levels = [
        "#######\n#@$  .#\n#######",
        "#######\n#..$$@#\n#######",
        CORRIDOR,
        ROOM,
        SEALED_GOAL,
    ];
    for text in levels {
        let b = board(text);
        let start = StateKey::normalized(&b, b.start_agent(), *b.start_boxes());
        let optimum = brute_force(&b, start);
        let outcome = solve(text, SolverConfig::default()).unwrap();
        match optimum {
            Some(pushes) => {
                assert_eq!(outcome.status, SearchStatus::Solved, "{text}");
                let solution = outcome.solution.unwrap();
                assert_eq!(solution.pushes, pushes, "{text}");
                assert_eq!(play(text, &solution.lurd()), Some(pushes as usize), "{text}");
            }
            None => {
                assert_eq!(outcome.status, SearchStatus::Exhausted, "{text}");
                assert!(outcome.solution.is_none());
            }
        }
    }
}

#[test]
fn sealed_goal_level_keeps_its_solution() {
    let outcome = solve(SEALED_GOAL, SolverConfig::default()).unwrap();
    assert_eq!(outcome.status, SearchStatus::Solved);
    assert_eq!(outcome.solution.unwrap().pushes, 11);
}

#[test]
fn push_into_a_corner_is_a_simple_deadlock() {
    let level = "######\n\
                 #    #\n\
                 # $ .#\n\
                 #@   #\n\
                 ######";
    let outcome = solve(level, SolverConfig::default()).unwrap();
    assert_eq!(outcome.status, SearchStatus::Solved);
    assert_eq!(outcome.solution.unwrap().pushes, 2);
    assert!(outcome.deadlocks.get(DeadlockKind::Simple) >= 1);
}

#[test]
fn unmatchable_boxes_are_rejected_before_search() {
    // Both boxes are stuck on the top row and can only reach the goal there.
    let level = "########\n\
                 #@$ $ .#\n\
                 #    ###\n\
                 #.   ###\n\
                 ########";
    match solve(level, SolverConfig::default()) {
        Err(SolveError::Board(BoardError::Unmatchable { matched, boxes })) => {
            assert_eq!((matched, boxes), (1, 2));
        }
        other => panic!("expected an unmatchable board, got {other:?}"),
    }
}

#[test]
fn jammed_level_has_no_solution() {
    let outcome = solve("#######\n#..$$@#\n#######", SolverConfig::default()).unwrap();
    assert_eq!(outcome.status, SearchStatus::Exhausted);
    assert!(outcome.solution.is_none());
}

#[test]
fn malformed_level_is_a_level_error() {
    assert!(matches!(
        solve("#####\n#$ .#\n#####", SolverConfig::default()),
        Err(SolveError::Level(_))
    ));
}

fn room_keys() -> impl Strategy<Value = (usize, Vec<usize>)> {
    let b = board(ROOM);
    let cells = b.cell_count();
    let alive = b.alive_count();
    (0..cells, proptest::collection::btree_set(0..alive, 1..=2))
        .prop_map(|(agent, boxes)| (agent, boxes.into_iter().collect()))
}

proptest! {
    #[test]
    fn canonical_form_is_idempotent((agent, boxes) in room_keys()) {
        let b = board(ROOM);
        prop_assume!(!boxes.contains(&agent));
        let boxes: BoxSet = boxes.into_iter().collect();
        let canon = canonical_of(&b, agent as Cell, boxes);
        prop_assert_eq!(canonical_of(&b, canon.agent, canon.boxes), canon);

        let syms = b.symmetries();
        for i in 0..syms.len() {
            let sym = syms.get(i);
            let image = canonical_of(&b, sym.map_cell(agent as Cell), sym.map_boxes(&boxes));
            prop_assert_eq!(image, canon);
        }
    }
}
