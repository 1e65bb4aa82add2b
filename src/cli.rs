use anyhow::{Context, Result};
use ipam::{HostAllocator, IpamError, NetworkAllocator};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Command names and their arguments, in the order they are listed in the usage text.
const COMMANDS: &[(&str, &str)] = &[
    ("create-network", "<network-id> <cidr>"),
    ("destroy-network", "<network-id>"),
    ("allocate-address", "<network-id> <address-id>"),
    ("free-address", "<network-id> <address-id>"),
    ("list-allocations", "<network-id>"),
    ("create-host", "<host-id> <start-port> <end-port>"),
    ("delete-host", "<host-id>"),
    ("allocate-port", "<host-id> <port-id>"),
    ("free-port", "<host-id> <port-id>"),
    ("list-ports", "<host-id>"),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("no command given")]
    MissingCommand,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("Usage: ipam {command} {args}")]
    WrongArguments {
        command: &'static str,
        args: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    CreateNetwork { network_id: String, cidr: String },
    DestroyNetwork { network_id: String },
    AllocateAddress { network_id: String, address_id: String },
    FreeAddress { network_id: String, address_id: String },
    ListAllocations { network_id: String },
    CreateHost { host_id: String, start_port: i64, end_port: i64 },
    DeleteHost { host_id: String },
    AllocatePort { host_id: String, port_id: String },
    FreePort { host_id: String, port_id: String },
    ListPorts { host_id: String },
}

pub fn usage() -> String {
    let mut text = String::from("IPAM CLI\n\nUsage:\n  ipam <command> [arguments]\n\nCommands:\n");
    for (i, (name, args)) in COMMANDS.iter().enumerate() {
        match i {
            0 => text.push_str("  NETWORK MANAGEMENT:\n"),
            5 => text.push_str("\n  HOST MANAGEMENT:\n"),
            _ => {}
        }
        text.push_str(&format!("  {} {}\n", name, args));
    }
    text
}

/// Turns the arguments following the program name into a [`Command`].
pub fn parse(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Err(UsageError::MissingCommand.into());
    };
    let owned = |s: &String| s.to_string();

    let command = match (name.as_str(), rest) {
        ("help" | "--help" | "-h", []) => Command::Help,
        ("create-network", [network_id, cidr]) => Command::CreateNetwork {
            network_id: owned(network_id),
            cidr: owned(cidr),
        },
        ("destroy-network", [network_id]) => Command::DestroyNetwork {
            network_id: owned(network_id),
        },
        ("allocate-address", [network_id, address_id]) => Command::AllocateAddress {
            network_id: owned(network_id),
            address_id: owned(address_id),
        },
        ("free-address", [network_id, address_id]) => Command::FreeAddress {
            network_id: owned(network_id),
            address_id: owned(address_id),
        },
        ("list-allocations", [network_id]) => Command::ListAllocations {
            network_id: owned(network_id),
        },
        ("create-host", [host_id, start, end]) => Command::CreateHost {
            host_id: owned(host_id),
            start_port: parse_port("start", start)?,
            end_port: parse_port("end", end)?,
        },
        ("delete-host", [host_id]) => Command::DeleteHost {
            host_id: owned(host_id),
        },
        ("allocate-port", [host_id, port_id]) => Command::AllocatePort {
            host_id: owned(host_id),
            port_id: owned(port_id),
        },
        ("free-port", [host_id, port_id]) => Command::FreePort {
            host_id: owned(host_id),
            port_id: owned(port_id),
        },
        ("list-ports", [host_id]) => Command::ListPorts {
            host_id: owned(host_id),
        },
        (name, _) => {
            let err = match COMMANDS.iter().find(|(command, _)| *command == name) {
                Some(&(command, args)) => UsageError::WrongArguments { command, args },
                None => UsageError::UnknownCommand(name.to_string()),
            };
            return Err(err.into());
        }
    };

    Ok(command)
}

fn parse_port(which: &str, value: &str) -> Result<i64> {
    value.parse().map_err(|e| {
        anyhow::Error::from(IpamError::InvalidArgument(format!(
            "invalid {} port '{}': {}",
            which, value, e
        )))
    })
}

/// Runs `command` against the records in `data_dir`, writing its output to `out`.
pub fn execute(command: Command, data_dir: &Path, out: &mut impl Write) -> Result<()> {
    let networks = NetworkAllocator::new(data_dir);
    let hosts = HostAllocator::new(data_dir);

    match command {
        Command::Help => write!(out, "{}", usage())?,
        Command::CreateNetwork { network_id, cidr } => {
            networks.create_network(&network_id, &cidr)?;
            writeln!(out, "Network created")?;
        }
        Command::DestroyNetwork { network_id } => {
            networks.destroy_network(&network_id)?;
            writeln!(out, "Network destroyed")?;
        }
        Command::AllocateAddress {
            network_id,
            address_id,
        } => {
            let address = networks.allocate_address(&network_id, &address_id)?;
            writeln!(out, "{}", address)?;
        }
        Command::FreeAddress {
            network_id,
            address_id,
        } => {
            networks.free_address(&network_id, &address_id)?;
            writeln!(out, "Address freed")?;
        }
        Command::ListAllocations { network_id } => {
            let allocations = networks.list_allocations(&network_id)?;
            if allocations.is_empty() {
                writeln!(out, "No allocations")?;
            }
            for (id, address) in allocations {
                writeln!(out, "{}: {}", id, address)?;
            }
        }
        Command::CreateHost {
            host_id,
            start_port,
            end_port,
        } => {
            hosts.create_host(&host_id, start_port, end_port)?;
            writeln!(out, "Host created")?;
        }
        Command::DeleteHost { host_id } => {
            hosts.delete_host(&host_id)?;
            writeln!(out, "Host deleted")?;
        }
        Command::AllocatePort { host_id, port_id } => {
            let port = hosts.allocate_port(&host_id, &port_id)?;
            writeln!(out, "{}", port)?;
        }
        Command::FreePort { host_id, port_id } => {
            hosts.free_port(&host_id, &port_id)?;
            writeln!(out, "Port freed")?;
        }
        Command::ListPorts { host_id } => {
            let ports = hosts.list_ports(&host_id)?;
            if ports.is_empty() {
                writeln!(out, "No ports allocated")?;
            }
            for (id, port) in ports {
                writeln!(out, "{}: {}", id, port)?;
            }
        }
    }

    out.flush().context("Failed to flush output")
}
