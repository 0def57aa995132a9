use std::{
    env,
    io::{self, Write},
};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, terminal,
};

use crate::app::launcher::launch_background;
use crate::manager::TaskManager;
use crate::models::task::{TaskId, TaskStatus, TaskSummary};

const HELP: &[&str] = &[
    "run <command>         start a shell command in the background",
    "list [status]         list tasks, optionally only one status",
    "status <id>           show one task",
    "output <id> [from]    print buffered output from a line offset",
    "tail <id>             print output not yet read",
    "kill <id>             terminate a running task",
    "remove <id>           forget a task",
    "cleanup               drop old finished tasks",
    "json                  dump all tasks as JSON",
    "exit                  quit and stop running tasks",
];

pub fn run_cli(manager: &TaskManager) -> io::Result<()> {
    println!("Background task console started. Enter a command or 'exit' to quit.");
    terminal::enable_raw_mode()?;
    let result = command_loop(manager);
    terminal::disable_raw_mode()?;
    println!();
    result
}

fn command_loop(manager: &TaskManager) -> io::Result<()> {
    let mut history: Vec<String> = Vec::new();
    while let Some(input) = read_line(&history)? {
        if !input.trim().is_empty() {
            history.push(input.clone());
        }
        if !dispatch(manager, &input)? {
            println!("\rExiting...");
            break;
        }
    }
    Ok(())
}

/// Reads one line in raw mode with Up/Down history. `None` on Ctrl-C/Ctrl-D.
fn read_line(history: &[String]) -> io::Result<Option<String>> {
    let mut input = String::new();
    let mut history_index = history.len();
    redraw(&input)?;

    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d')
                if key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                return Ok(None);
            }
            KeyCode::Enter => {
                println!();
                return Ok(Some(input));
            }
            KeyCode::Up => {
                if history_index > 0 {
                    history_index -= 1;
                    input = history[history_index].clone();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                if history_index < history.len() {
                    history_index += 1;
                    input = history.get(history_index).cloned().unwrap_or_default();
                    redraw(&input)?;
                }
            }
            KeyCode::Char(c) => {
                input.push(c);
                print!("{}", c);
                io::stdout().flush()?;
            }
            KeyCode::Backspace => {
                input.pop();
                redraw(&input)?;
            }
            _ => {}
        }
    }
}

fn redraw(input: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    print!(">>> {}", input);
    stdout.flush()
}

/// Runs one console command. Returns false when the console should exit.
fn dispatch(manager: &TaskManager, input: &str) -> io::Result<bool> {
    let (command, rest) = split_command(input);
    let mut args = rest.split_whitespace();

    match command {
        "" => {}
        "run" => {
            if rest.is_empty() {
                println!("\rCommand to execute must be specified.");
            } else {
                match launch_background(manager, rest, &env::current_dir()?) {
                    Ok(task) => {
                        println!("\rStarted task {} (pid {})", task.id, pid_label(task.pid));
                        println!("\rUse `status {}` to check the status", task.id);
                    }
                    Err(e) => println!("\rFailed to start task: {}", e),
                }
            }
        }
        "list" => {
            let filter = match args.next().map(str::parse::<TaskStatus>) {
                Some(Ok(status)) => Some(status),
                Some(Err(e)) => {
                    println!("\r{}", e);
                    return Ok(true);
                }
                None => None,
            };
            let tasks = manager.list_tasks(filter);
            if tasks.is_empty() {
                println!("\rNo tasks");
            } else {
                println!("\r{:<36}  {:<9}  {:>7}  {}", "ID", "STATUS", "PID", "COMMAND");
                println!("\r{}", "-".repeat(72));
                for task in tasks {
                    println!(
                        "\r{:<36}  {:<9}  {:>7}  {}",
                        task.id,
                        task.status,
                        pid_label(task.pid),
                        task.command
                    );
                }
            }
        }
        "status" => {
            if let Some(id) = parse_id(args.next()) {
                match manager.get_task(&id) {
                    Some(task) => {
                        println!("\rTask {} [{}]", task.id, task.status);
                        println!("\r  command:  {}", task.command);
                        println!("\r  cwd:      {}", task.cwd);
                        println!("\r  pid:      {}", pid_label(task.pid));
                        println!("\r  started:  {}", task.start_time.to_rfc3339());
                        println!("\r  exit:     {:?}  signal: {:?}", task.exit_code, task.signal);
                        if let Some(error) = &task.error {
                            println!("\r  error:    {}", error);
                        }
                        println!("\r  lines:    {}", task.output_buffer.len());
                    }
                    None => println!("\rTask {} not found", id),
                }
            }
        }
        "output" => {
            if let Some(id) = parse_id(args.next()) {
                let from = match args.next().map(str::parse::<usize>) {
                    Some(Ok(from)) => from,
                    Some(Err(_)) => {
                        println!("\rInvalid line offset.");
                        return Ok(true);
                    }
                    None => 0,
                };
                print_lines(id, manager.get_output(&id, from));
            }
        }
        "tail" => {
            if let Some(id) = parse_id(args.next()) {
                print_lines(id, manager.read_new_output(&id));
            }
        }
        "kill" => {
            if let Some(id) = parse_id(args.next()) {
                match manager.kill_task(&id) {
                    Ok(true) => println!("\rTask {} killed", id),
                    Ok(false) => println!("\rTask {} is not running", id),
                    Err(e) => println!("\r{}", e),
                }
            }
        }
        "remove" => {
            if let Some(id) = parse_id(args.next()) {
                if manager.remove_task(&id) {
                    println!("\rTask {} removed", id);
                } else {
                    println!("\rTask {} not found", id);
                }
            }
        }
        "cleanup" => {
            println!("\rRemoved {} finished task(s)", manager.cleanup());
        }
        "json" => {
            let summaries: Vec<TaskSummary> = manager
                .list_tasks(None)
                .iter()
                .map(|task| task.summary())
                .collect();
            let json = serde_json::to_string_pretty(&summaries).map_err(io::Error::other)?;
            for line in json.lines() {
                println!("\r{}", line);
            }
        }
        "help" => {
            for line in HELP {
                println!("\r{}", line);
            }
        }
        "exit" | "quit" => return Ok(false),
        other => {
            println!("\rUnknown command: {}. Type 'help' for a list.", other);
        }
    }
    Ok(true)
}

/// Splits off the first word, keeping the remainder verbatim apart from
/// surrounding whitespace.
fn split_command(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    }
}

fn parse_id(arg: Option<&str>) -> Option<TaskId> {
    match arg {
        None => {
            println!("\rTask ID must be specified.");
            None
        }
        Some(raw) => match raw.parse::<TaskId>() {
            Ok(id) => Some(id),
            Err(_) => {
                println!("\rInvalid task ID format.");
                None
            }
        },
    }
}

fn print_lines(id: TaskId, lines: Option<Vec<String>>) {
    match lines {
        Some(lines) if lines.is_empty() => println!("\r(no output)"),
        Some(lines) => {
            for line in lines {
                println!("\r{}", line);
            }
        }
        None => println!("\rTask {} not found", id),
    }
}

fn pid_label(pid: Option<u32>) -> String {
    pid.map_or_else(|| "NONE".to_string(), |pid| pid.to_string())
}
