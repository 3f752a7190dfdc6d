//! The line-edited debug console: a coroutine that reads `serial_rx` bytes
//! a line at a time and dispatches a fixed command table.
//!
//! Grounded in the reference kernel's `kernel::terminal` coroutine (the line
//! editor) and `start_kernel`'s inline command dispatch. Not part of the
//! kernel's core (nothing else depends on it); it exists so a human on the
//! console has something to drive the rest of the system with.

use alloc::format;
use alloc::string::String;
use core::fmt::Write as _;

use crate::coroutine::{wait_for, yield_to};
use crate::event_loop::{self, EventType};

const BACKSPACE: u8 = 0x7f;
const BACKSPACE_GUI: u8 = 0x08;

fn print(s: &str) {
    crate::drivers::uart::put_str(s);
}

fn println(s: &str) {
    print(s);
    print("\r\n");
}

/// Reads one line, echoing as it goes and honouring backspace. Returns
/// `None` if the line filled `capacity` bytes before a newline arrived.
async fn read_line(prompt: &str, capacity: usize) -> Option<String> {
    print(prompt);
    let mut line = String::new();
    loop {
        let byte = wait_for(EventType::SerialRx).await as u8;
        match byte {
            b'\r' | b'\n' => {
                println("");
                return Some(line);
            }
            BACKSPACE | BACKSPACE_GUI => {
                if line.pop().is_some() {
                    print("\u{8} \u{8}");
                }
            }
            c if c.is_ascii_graphic() || c == b' ' => {
                if line.len() >= capacity - 1 {
                    continue;
                }
                line.push(c as char);
                crate::drivers::uart::put(c);
            }
            _ => {}
        }
    }
}

fn parse_number(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn print_stats() {
    let stats = crate::heap::stats();
    let overhead = stats.num_blocks * stats.block_overhead;
    let used = stats.memory_allocated + overhead;
    let free = stats.memory_total.saturating_sub(used);
    println("Kernel statistics:");
    println("  Memory statistics:");
    println(&format!("    memory_total     = {}", stats.memory_total));
    println(&format!("    memory_allocated = {}", stats.memory_allocated));
    println(&format!("    memory_overhead  = {}", overhead));
    println(&format!("    memory_used      = {}", used));
    println(&format!("    memory_free      = {}", free));
    println(&format!("    num_allocations  = {}", stats.num_allocations));
    println(&format!("    num_blocks       = {}", stats.num_blocks));
    println(&format!("    block_overhead   = {}", stats.block_overhead));
}

fn cmd_malloc(arg: &str) {
    let size = parse_number(arg).unwrap_or(100);
    let ptr = crate::heap::raw_alloc(size);
    println(&format!("Allocated {} bytes of memory: {:?}", size, ptr));
}

fn cmd_free(arg: &str) {
    let Some(addr) = parse_number(arg) else {
        println("Cannot parse pointer");
        return;
    };
    let ptr = addr as *mut u8;
    println(&format!("Freeing allocated memory: {:?}", ptr));
    crate::heap::raw_free(ptr);
}

fn cmd_led(arg: &str) {
    let arg = arg.trim();
    let (number, on) = if let Some(rest) = arg.strip_suffix(" on") {
        (rest, true)
    } else if let Some(rest) = arg.strip_suffix(" off") {
        (rest, false)
    } else {
        println("Usage: led n on/off");
        return;
    };
    let Some(led) = parse_number(number) else {
        println(&format!("Cannot parse LED number: \"{}\"", number));
        return;
    };
    let leds = crate::drivers::gpio::LEDS;
    if led < 1 || led > leds.len() {
        println(&format!("LED number {} is not between 1 and {}.", led, leds.len()));
        return;
    }
    leds[led - 1].set(on);
    println(&format!("Turned LED {} {}.", led, if on { "on" } else { "off" }));
}

fn print_help() {
    println("Available commands:");
    println("hello          - print \"world\"");
    println("debug          - toggle debug mode");
    println("stats          - show (memory) stats");
    println("malloc <n>     - allocate n bytes of dynamic memory");
    println("free <p>       - free the memory at pointer p");
    println("led <n> on|off - turn LED n on or off");
    println("whoami         - print the id of the current coroutine");
    println("trap           - trigger an undefined instruction exception");
    println("breakpoint     - trigger a prefetch abort exception");
    println("syscall        - trigger a software interrupt exception");
    println("unaligned      - trigger a data abort exception");
    println("reboot         - reboot the system");
    println("restart        - reboot the system");
    println("shutdown       - shut the system down");
    println("poweroff       - shut the system down");
    println("panic          - cause a kernel panic");
    println("move           - migrate this shell to the secondary event loop and back");
    println("help           - display this help message");
}

#[cfg(target_arch = "arm")]
fn trigger_trap() {
    unsafe { core::arch::asm!("udf #0", options(nomem, nostack)) };
}
#[cfg(target_arch = "arm")]
fn trigger_breakpoint() {
    unsafe { core::arch::asm!("bkpt", options(nomem, nostack)) };
}
#[cfg(target_arch = "arm")]
fn trigger_syscall() {
    unsafe { core::arch::asm!("svc #0", options(nomem, nostack)) };
}
#[cfg(target_arch = "arm")]
fn trigger_unaligned() {
    unsafe {
        let address: u32 = 0x1;
        core::arch::asm!("ldr r0, [{0}]", in(reg) address, out("r0") _, options(nostack));
    }
}

#[cfg(not(target_arch = "arm"))]
fn trigger_trap() {
    kwarn!("'trap' has no effect on this host");
}
#[cfg(not(target_arch = "arm"))]
fn trigger_breakpoint() {
    kwarn!("'breakpoint' has no effect on this host");
}
#[cfg(not(target_arch = "arm"))]
fn trigger_syscall() {
    kwarn!("'syscall' has no effect on this host");
}
#[cfg(not(target_arch = "arm"))]
fn trigger_unaligned() {
    kwarn!("'unaligned' has no effect on this host");
}

/// Runs the shell forever: reads a line, dispatches it, repeats. Meant to
/// be [`crate::coroutine::spawn`]ed onto the main event loop.
pub async fn run() -> ! {
    let mut debug_mode = false;
    loop {
        let Some(line) = read_line("kernel@localhost:/# ", 256).await else {
            kwarn!("Line too long, please keep it under 256 characters.");
            continue;
        };
        let line = line.trim();

        if line == "hello" {
            println("world");
        } else if line == "debug" {
            debug_mode = !debug_mode;
            println(&format!("Debug mode is {}.", if debug_mode { "on" } else { "off" }));
        } else if line == "stats" {
            print_stats();
        } else if let Some(arg) = line.strip_prefix("malloc ") {
            cmd_malloc(arg);
        } else if let Some(arg) = line.strip_prefix("free ") {
            cmd_free(arg);
        } else if let Some(arg) = line.strip_prefix("led ") {
            cmd_led(arg);
        } else if line == "whoami" {
            match crate::coroutine::current_task() {
                Some(id) => println(&format!("I am coroutine #{}!", id.id())),
                None => println("I am not running inside a coroutine."),
            }
        } else if line == "trap" {
            println("Before trap");
            trigger_trap();
            println("After trap");
        } else if line == "breakpoint" {
            println("Before breakpoint");
            trigger_breakpoint();
            println("After breakpoint");
        } else if line == "syscall" {
            println("Before syscall");
            trigger_syscall();
            println("After syscall");
        } else if line == "unaligned" {
            println("Before unaligned memory access");
            trigger_unaligned();
            println("After unaligned memory access");
        } else if line == "reboot" || line == "restart" {
            crate::drivers::watchdog::restart();
        } else if line == "shutdown" || line == "poweroff" {
            crate::drivers::watchdog::poweroff();
        } else if line == "panic" {
            panic!("\"panic\" command used");
        } else if line == "move" {
            yield_to(event_loop::secondary_event_loop()).await;
            println("Moved to the secondary event loop.");
            for _ in 0..10 {
                print(".");
                for _ in 0..25 {
                    wait_for(EventType::Tick).await;
                }
            }
            println("");
            yield_to(event_loop::main_event_loop()).await;
            println("Moved back to the main event loop.");
        } else if line == "help" {
            print_help();
        } else if line.is_empty() {
            // nothing to do
        } else {
            let mut msg = String::new();
            let _ = write!(msg, "Unknown command: {}", line);
            println(&msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_accepts_decimal_and_hex() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x2a"), Some(42));
        assert_eq!(parse_number("not a number"), None);
    }
}
