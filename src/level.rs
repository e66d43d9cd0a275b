//! XSB level text loader.
//!
//! `#` wall, `@` agent, `+` agent on goal, `$` box, `*` box on goal, `.` goal,
//! space / `-` / `_` floor. Lines may be ragged; missing cells count as floor
//! and are cut away later by the agent flood fill.

use std::str::FromStr;

use memchr::memchr_iter;
use smallvec::SmallVec;

use crate::error::LevelError;

pub const TILE_FLOOR: u8 = 0;
pub const TILE_WALL: u8 = 1;
pub const TILE_GOAL: u8 = 2;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[repr(C)]
pub struct Point {
    pub row: i16,
    pub col: i16,
}

impl Point {
    #[inline(always)]
    pub const fn new(row: i16, col: i16) -> Self {
        Point { row, col }
    }
}

pub type PointVec = SmallVec<[Point; 20]>;

#[derive(Clone, Debug)]
pub struct Level {
    pub width: i16,
    pub height: i16,
    pub tiles: Vec<u8>,
    pub agent: Point,
    pub boxes: PointVec,
    pub goals: PointVec,
}

impl Level {
    pub fn parse(text: &str) -> Result<Self, LevelError> {
        let bytes = text.as_bytes();
        let mut lines: Vec<&[u8]> = Vec::new();
        let mut start = 0;
        for end in memchr_iter(b'\n', bytes).chain(std::iter::once(bytes.len())) {
            let mut line = &bytes[start..end.max(start)];
            if let Some((&b'\r', rest)) = line.split_last() {
                line = rest;
            }
            lines.push(line);
            start = end + 1;
        }
        while lines.last().is_some_and(|l| l.iter().all(u8::is_ascii_whitespace)) {
            lines.pop();
        }
        while lines.first().is_some_and(|l| l.iter().all(u8::is_ascii_whitespace)) {
            lines.remove(0);
        }
        if lines.is_empty() {
            return Err(LevelError::Empty);
        }

        let height = lines.len();
        let width = lines.iter().map(|l| l.len()).max().unwrap_or(0);
        let mut tiles = vec![TILE_FLOOR; width * height];
        let mut agent = None;
        let mut boxes = PointVec::new();
        let mut goals = PointVec::new();

        for (row, line) in lines.iter().enumerate() {
            for (col, &ch) in line.iter().enumerate() {
                let here = Point::new(row as i16, col as i16);
                let idx = row * width + col;
                match ch {
                    b'#' => tiles[idx] = TILE_WALL,
                    b' ' | b'-' | b'_' => {}
                    b'.' => {
                        tiles[idx] = TILE_GOAL;
                        goals.push(here);
                    }
                    b'$' => boxes.push(here),
                    b'*' => {
                        tiles[idx] = TILE_GOAL;
                        goals.push(here);
                        boxes.push(here);
                    }
                    b'@' | b'+' => {
                        if agent.is_some() {
                            return Err(LevelError::MultipleAgents { row, col });
                        }
                        agent = Some(here);
                        if ch == b'+' {
                            tiles[idx] = TILE_GOAL;
                            goals.push(here);
                        }
                    }
                    other => {
                        return Err(LevelError::BadChar {
                            ch: other as char,
                            row,
                            col,
                        })
                    }
                }
            }
        }

        let agent = agent.ok_or(LevelError::NoAgent)?;
        Ok(Level {
            width: width as i16,
            height: height as i16,
            tiles,
            agent,
            boxes,
            goals,
        })
    }

    #[inline(always)]
    pub fn is_valid(&self, row: i16, col: i16) -> bool {
        row >= 0 && row < self.height && col >= 0 && col < self.width
    }

    #[inline(always)]
    pub fn to_idx(&self, row: i16, col: i16) -> usize {
        row as usize * self.width as usize + col as usize
    }

    #[inline(always)]
    pub fn is_wall(&self, row: i16, col: i16) -> bool {
        !self.is_valid(row, col) || self.tiles[self.to_idx(row, col)] == TILE_WALL
    }
}

impl FromStr for Level {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_markers() {
        let level: Level = "#####\n#@$.#\n#####\n".parse().unwrap();
        assert_eq!(level.width, 5);
        assert_eq!(level.height, 3);
        assert_eq!(level.agent, Point::new(1, 1));
        assert_eq!(level.boxes.as_slice(), &[Point::new(1, 2)]);
        assert_eq!(level.goals.as_slice(), &[Point::new(1, 3)]);
        assert!(level.is_wall(0, 0));
        assert!(level.is_wall(-1, 2));
        assert!(!level.is_wall(1, 2));
    }

    #[test]
    fn box_and_agent_on_goal() {
        let level = Level::parse("####\r\n#+*#\r\n####").unwrap();
        assert_eq!(level.goals.len(), 2);
        assert_eq!(level.boxes.len(), 1);
        assert_eq!(level.tiles[level.to_idx(1, 1)], TILE_GOAL);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Level::parse("\n  \n").unwrap_err(), LevelError::Empty);
        assert_eq!(Level::parse("#$.#").unwrap_err(), LevelError::NoAgent);
        assert_eq!(
            Level::parse("#@@#").unwrap_err(),
            LevelError::MultipleAgents { row: 0, col: 2 }
        );
        assert!(matches!(
            Level::parse("#@x#").unwrap_err(),
            LevelError::BadChar { ch: 'x', .. }
        ));
    }
}
