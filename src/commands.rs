/// Available commands, autocomplete and argument parsing
use std::path::PathBuf;

use crate::cache::Entity;
use crate::filters::{parse_date, Branch, DateRange, ProductLine, SalesTarget};
use crate::preferences::DataMode;

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home"],
    description: "Revenue, growth and branches",
  },
  Command {
    name: "products",
    aliases: &["p", "product"],
    description: "Product analytics",
  },
  Command {
    name: "branches",
    aliases: &["b", "heatmap"],
    description: "Branch performance and heatmap",
  },
  Command {
    name: "salespeople",
    aliases: &["s", "sales", "leaderboard"],
    description: "Salesperson leaderboard",
  },
  Command {
    name: "upload",
    aliases: &["u", "ingest"],
    description: "Upload a data file: upload <path>",
  },
  Command {
    name: "branch",
    aliases: &["br"],
    description: "Filter by branch: branch <name|all>",
  },
  Command {
    name: "line",
    aliases: &["pl", "product-line"],
    description: "Filter by product line: line <name|all>",
  },
  Command {
    name: "range",
    aliases: &["r", "dates"],
    description: "Date range: range <from> <to> | range all",
  },
  Command {
    name: "month",
    aliases: &["m"],
    description: "Single month: month <YYYY-MM>",
  },
  Command {
    name: "target",
    aliases: &["t"],
    description: "Sales target: target <amount>",
  },
  Command {
    name: "reset",
    aliases: &[],
    description: "Reset all filters",
  },
  Command {
    name: "invalidate",
    aliases: &["inv", "refresh"],
    description: "Mark data stale: invalidate [product|salesperson|branch]",
  },
  Command {
    name: "mode",
    aliases: &[],
    description: "Switch data source: mode [rest|graphql]",
  },
  Command {
    name: "clear-cache",
    aliases: &["cc"],
    description: "Drop cached and persisted data",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit salescope",
  },
];

/// Top-level screens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
  Dashboard,
  Products,
  Branches,
  Salespeople,
  Upload,
}

impl Page {
  pub const ALL: [Page; 5] = [
    Page::Dashboard,
    Page::Products,
    Page::Branches,
    Page::Salespeople,
    Page::Upload,
  ];

  pub fn next(self) -> Page {
    let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
    Self::ALL[(idx + 1) % Self::ALL.len()]
  }
}

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
  Open(Page),
  /// Open the upload screen, optionally selecting a file
  Upload(Option<PathBuf>),
  Branch(Branch),
  ProductLine(ProductLine),
  Range(DateRange),
  Target(SalesTarget),
  Reset,
  /// `None` invalidates everything
  Invalidate(Option<Entity>),
  /// `None` toggles
  Mode(Option<DataMode>),
  ClearCache,
  Quit,
}

/// Get autocomplete suggestions for the command word of `input`
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input
    .split_whitespace()
    .next()
    .unwrap_or("")
    .to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    if cmd.name == input_lower {
      matches.push((cmd, 0));
    } else if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
    } else if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
    } else if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
    } else if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
    }
  }

  matches.sort_by_key(|(cmd, priority)| (*priority, cmd.name.len()));
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Replace the command word with the chosen suggestion, keeping arguments
pub fn complete(input: &str, suggestion: &Command) -> String {
  let args = input
    .trim_start()
    .split_once(char::is_whitespace)
    .map(|(_, rest)| rest.trim())
    .unwrap_or("");
  if args.is_empty() {
    suggestion.name.to_string()
  } else {
    format!("{} {}", suggestion.name, args)
  }
}

/// Parse a full command line such as `branch Nairobi` or `month 2024-01`
pub fn parse(input: &str) -> Result<Action, String> {
  let input = input.trim();
  let (word, args) = match input.split_once(char::is_whitespace) {
    Some((word, args)) => (word, args.trim()),
    None => (input, ""),
  };
  let word = word.to_lowercase();
  let arg = (!args.is_empty()).then_some(args);

  match word.as_str() {
    "dashboard" | "d" | "home" => Ok(Action::Open(Page::Dashboard)),
    "products" | "p" | "product" => Ok(Action::Open(Page::Products)),
    "branches" | "b" | "heatmap" => Ok(Action::Open(Page::Branches)),
    "salespeople" | "s" | "sales" | "leaderboard" => Ok(Action::Open(Page::Salespeople)),
    "upload" | "u" | "ingest" => Ok(Action::Upload(arg.map(PathBuf::from))),
    "branch" | "br" => Ok(Action::Branch(Branch::parse(arg))),
    "line" | "pl" | "product-line" => Ok(Action::ProductLine(ProductLine::parse(arg))),
    "range" | "r" | "dates" => parse_range(args).map(Action::Range),
    "month" | "m" => parse_month(args).map(Action::Range),
    "target" | "t" => SalesTarget::parse(args)
      .map(Action::Target)
      .map_err(|e| e.to_string()),
    "reset" => Ok(Action::Reset),
    "invalidate" | "inv" | "refresh" => match arg {
      None | Some("all") => Ok(Action::Invalidate(None)),
      Some(entity) => entity.parse().map(|e| Action::Invalidate(Some(e))),
    },
    "mode" => match arg {
      None => Ok(Action::Mode(None)),
      Some("rest") => Ok(Action::Mode(Some(DataMode::Rest))),
      Some("graphql") => Ok(Action::Mode(Some(DataMode::GraphQl))),
      Some(other) => Err(format!("unknown mode '{}'", other)),
    },
    "rest" => Ok(Action::Mode(Some(DataMode::Rest))),
    "graphql" => Ok(Action::Mode(Some(DataMode::GraphQl))),
    "clear-cache" | "cc" => Ok(Action::ClearCache),
    "quit" | "q" | "exit" => Ok(Action::Quit),
    "" => Err("empty command".to_string()),
    other => Err(format!("unknown command '{}'", other)),
  }
}

fn parse_range(args: &str) -> Result<DateRange, String> {
  let parts: Vec<&str> = args.split_whitespace().collect();
  match parts.as_slice() {
    ["all"] | [] => Ok(DateRange::full_history()),
    [from, to] => {
      let bound = |s: &str| match s {
        "-" | "*" => Ok(None),
        s => parse_date(s).map(Some),
      };
      DateRange::new(bound(from).map_err(|e| e.to_string())?, bound(to).map_err(|e| e.to_string())?)
        .map_err(|e| e.to_string())
    }
    _ => Err("usage: range <from> <to>".to_string()),
  }
}

fn parse_month(args: &str) -> Result<DateRange, String> {
  parse_date(&format!("{}-01", args.trim()))
    .map(DateRange::month_of)
    .map_err(|_| format!("expected YYYY-MM, got '{}'", args))
}
